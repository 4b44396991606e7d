//! Model inspection command.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use strata_abstraction::{Attribute, AttributeKind};
use strata_training::{learners, load_artifact};

pub fn execute(model: &str, json_output: bool) -> Result<()> {
    let artifact =
        load_artifact(model).with_context(|| format!("Failed to load model {}", model))?;
    let learner = learners::by_name(&artifact.learner, &serde_json::Value::Null)?;
    let restored = artifact.restore(learner.as_ref()).context("Failed to restore model")?;
    let schema = &artifact.schema;

    if json_output {
        let attributes: Vec<_> = schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, a)| {
                json!({
                    "name": a.name,
                    "kind": kind_label(a),
                    "values": a.labels(),
                    "class": Some(i) == schema.class_index(),
                })
            })
            .collect();
        let out = json!({
            "id": artifact.id,
            "created_at": artifact.created_at,
            "learner": artifact.learner,
            "options": artifact.options,
            "capabilities": artifact.capabilities,
            "relation": schema.relation,
            "attributes": attributes,
            "priors": artifact.priors,
            "model": restored.describe(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Model {}", artifact.id).bold().cyan());
    println!("  Learner:  {} {}", artifact.learner, artifact.options.dimmed());
    println!("  Created:  {}", artifact.created_at.to_rfc3339());
    println!("  Relation: {}", schema.relation);
    println!();
    println!("{:<4} {:<24} {:<10} {}", "#", "Attribute", "Kind", "Values");
    println!("{}", "─".repeat(70));
    for (i, attribute) in schema.attributes().iter().enumerate() {
        let name = if Some(i) == schema.class_index() {
            format!("{} (class)", attribute.name).green().to_string()
        } else {
            attribute.name.clone()
        };
        println!(
            "{:<4} {:<24} {:<10} {}",
            i,
            name,
            kind_label(attribute),
            attribute.labels().join(", ").dimmed()
        );
    }
    println!();
    println!("{}", restored.describe());
    Ok(())
}

fn kind_label(attribute: &Attribute) -> &'static str {
    match attribute.kind {
        AttributeKind::Numeric => "numeric",
        AttributeKind::Nominal { .. } => "nominal",
        AttributeKind::String { .. } => "string",
        AttributeKind::Date => "date",
    }
}
