use crate::error::{DeployerError, Result};
use crate::models::ResourceGraph;
use std::collections::HashSet;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Frame {
    Enter,
    Exit,
}

/// Reject relation cycles in a planned resource graph.
///
/// Iterative depth-first traversal over relation targets and hosts with an
/// explicit recursion stack. The error names the resources on the cycle,
/// starting and ending with the repeated key.
pub fn check_circular_dependencies(resources: &ResourceGraph) -> Result<()> {
    let mut finished: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();

    for start in resources.keys() {
        if finished.contains(start.as_str()) {
            continue;
        }
        let mut work: Vec<(&str, Frame)> = vec![(start.as_str(), Frame::Enter)];
        while let Some((key, frame)) = work.pop() {
            if frame == Frame::Exit {
                path.pop();
                finished.insert(key);
                continue;
            }
            if finished.contains(key) {
                continue;
            }
            if let Some(position) = path.iter().position(|k| *k == key) {
                let mut cycle: Vec<String> = path[position..].iter().map(|k| k.to_string()).collect();
                cycle.push(key.to_string());
                return Err(DeployerError::CircularDependency { cycle });
            }
            let Some(resource) = resources.get(key) else {
                continue;
            };
            path.push(key);
            work.push((key, Frame::Exit));
            for dependency in resource.dependencies().into_iter().rev() {
                if !finished.contains(dependency) {
                    work.push((dependency, Frame::Enter));
                }
            }
        }
    }
    Ok(())
}
