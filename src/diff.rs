use crate::pipeline::PipelineDefinition;

/// Human-readable differences between two definitions; empty when equal.
pub fn diff_definitions(left: &PipelineDefinition, right: &PipelineDefinition) -> Vec<String> {
    let mut differences = Vec::new();

    if left.name != right.name {
        differences.push(format!(
            "Pipeline name differs: '{}' vs '{}'",
            left.name, right.name
        ));
    }
    if left.source != right.source {
        differences.push(format!(
            "Source differs: '{}' vs '{}'",
            left.source, right.source
        ));
    }

    let left_steps: Vec<_> = left.steps().collect();
    let right_steps: Vec<_> = right.steps().collect();
    let min_len = left_steps.len().min(right_steps.len());
    if left_steps.len() != right_steps.len() {
        differences.push(format!(
            "Step count differs: {} vs {}",
            left_steps.len(),
            right_steps.len()
        ));
    }

    for (idx, (l_step, r_step)) in left_steps
        .iter()
        .zip(right_steps.iter())
        .take(min_len)
        .enumerate()
    {
        if l_step.name != r_step.name {
            differences.push(format!(
                "Step {} name differs: '{}' vs '{}'",
                idx + 1,
                l_step.name,
                r_step.name
            ));
            continue;
        }
        if l_step.env != r_step.env {
            differences.push(format!(
                "Step '{}' environment variables differ: {:?} vs {:?}",
                l_step.name, l_step.env, r_step.env
            ));
        }
        if l_step.environment != r_step.environment {
            differences.push(format!(
                "Step '{}' build environment differs",
                l_step.name
            ));
        }
        if l_step.install_commands != r_step.install_commands {
            differences.push(format!(
                "Step '{}' install commands differ: {:?} vs {:?}",
                l_step.name, l_step.install_commands, r_step.install_commands
            ));
        }
        if l_step.run_commands != r_step.run_commands {
            differences.push(format!(
                "Step '{}' run commands differ: {:?} vs {:?}",
                l_step.name, l_step.run_commands, r_step.run_commands
            ));
        }
        if l_step.project_name != r_step.project_name {
            differences.push(format!(
                "Step '{}' project name differs: {:?} vs {:?}",
                l_step.name, l_step.project_name, r_step.project_name
            ));
        }
    }

    for step in &left_steps[min_len..] {
        differences.push(format!("Extra step in left pipeline: '{}'", step.name));
    }
    for step in &right_steps[min_len..] {
        differences.push(format!("Extra step in right pipeline: '{}'", step.name));
    }

    if left.stages != right.stages {
        let describe = |definition: &PipelineDefinition| {
            definition
                .stages
                .iter()
                .map(|stage| stage.construct_id.clone())
                .collect::<Vec<_>>()
        };
        differences.push(format!(
            "Deployment stages differ: {:?} vs {:?}",
            describe(left),
            describe(right)
        ));
    }

    differences
}
