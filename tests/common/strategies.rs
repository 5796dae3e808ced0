use deployer_core::models::{
    Blueprint, BlueprintOption, Constraint, Deployment, Environment, OptionTarget,
    ProviderBinding, ServiceDefinition, WorkflowType,
};
use deployer_core::workflow::{TaskCall, TaskDag, TaskProperties, Workflow};
use proptest::prelude::*;
use serde_json::json;

/// Which of the seven setting sources are present, highest precedence first
pub fn setting_layers_strategy() -> impl Strategy<Value = [bool; 7]> {
    proptest::array::uniform7(any::<bool>())
}

/// Deployment resolving `size` for the db service's volume, with source `i`
/// holding the value `i` when `layers[i]` is set. The caller default is the
/// last layer and is passed at lookup time.
pub fn layered_deployment(layers: [bool; 7]) -> Deployment {
    let mut db = ServiceDefinition::new("compute");
    if layers[3] {
        db = db.with_constraint(Constraint::new("size", json!(3)).for_type("volume"));
    }
    let option = BlueprintOption {
        default: layers[4].then(|| json!(4)),
        required: false,
        constrains: vec![OptionTarget {
            service: Some("db".into()),
            resource_type: Some("volume".into()),
            setting: "size".into(),
        }],
    };
    let blueprint = Blueprint::new("bp", "layers")
        .with_service("db", db)
        .with_option("disk", option);

    let mut binding = ProviderBinding::default();
    if layers[5] {
        binding = binding.with_default(Constraint::new("size", json!(5)).for_type("volume"));
    }
    let environment = Environment::new("test").with_provider("cbs", binding);

    let mut deployment = Deployment::new("d", "t", blueprint, environment);
    if layers[0] {
        deployment = deployment.with_input("db:volume/size", json!(0));
    }
    if layers[1] {
        deployment = deployment.with_input("size", json!(1));
    }
    if layers[2] {
        deployment = deployment.with_input("disk", json!(2));
    }
    deployment
}

/// Workflow of `width` independent provider calls hanging off Start
pub fn flat_workflow(width: usize) -> Workflow {
    let mut dag = TaskDag::new();
    let start = dag.start();
    for index in 0..width {
        let id = dag.add_call(
            format!("Task {index}"),
            TaskCall::new("nova", "noop"),
            TaskProperties::new(),
        );
        dag.connect(start, id).expect("start is always present");
    }
    Workflow::new("t", "d", WorkflowType::Build, dag)
}

/// A width and an order in which to complete that many tasks
pub fn completion_order_strategy() -> impl Strategy<Value = Vec<usize>> {
    (1usize..=24).prop_flat_map(|width| Just((0..width).collect::<Vec<_>>()).prop_shuffle())
}
