//! Prompt registry and A/B commands.

use std::collections::BTreeMap;

use crate::cli::output;
use crate::domain::error::{CortexError, Result};
use crate::domain::models::Variant;
use crate::services::prompt_registry::{PromptRegistryService, VersionSelector};

use super::AppContext;

pub fn handle_create_version(
    ctx: &AppContext,
    prompt_id: String,
    version: String,
    content: String,
    json: bool,
) -> Result<()> {
    let content = if let Some(path) = content.strip_prefix('@') {
        std::fs::read_to_string(path)?
    } else {
        content
    };
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let record = svc.create_version(&prompt_id, &version, &content, BTreeMap::new())?;
    if json {
        output::print_json(&record);
    } else {
        println!(
            "created {prompt_id} v{version} ({}, hash {})",
            record.status.as_str(),
            &record.content_hash[..12]
        );
    }
    Ok(())
}

pub fn handle_activate(
    ctx: &AppContext,
    prompt_id: String,
    version: String,
    json: bool,
) -> Result<()> {
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let record = svc.activate(&prompt_id, &version)?;
    if json {
        output::print_json(&record);
    } else {
        println!("activated {prompt_id} v{version}");
    }
    Ok(())
}

pub fn handle_get(
    ctx: &AppContext,
    prompt_id: String,
    version: Option<String>,
    json: bool,
) -> Result<()> {
    let selector = match version.as_deref() {
        None => VersionSelector::Active,
        Some("latest") => VersionSelector::Latest,
        Some(pinned) => VersionSelector::Pinned(pinned.to_string()),
    };
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let record = svc.get(&prompt_id, &selector)?;
    if json {
        output::print_json(&record);
    } else {
        println!("{}", record.content);
    }
    Ok(())
}

pub fn handle_ab_create(
    ctx: &AppContext,
    name: String,
    prompt_id: String,
    control: String,
    treatment: String,
    traffic_split: u8,
    json: bool,
) -> Result<()> {
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let test = svc.create_ab(&name, &prompt_id, &control, &treatment, traffic_split)?;
    if json {
        output::print_json(&test);
    } else {
        println!(
            "created {} ({}% of traffic to v{})",
            test.test_id, test.traffic_split, test.treatment_version
        );
    }
    Ok(())
}

pub fn handle_ab_select(
    ctx: &AppContext,
    test_id: String,
    task_id: String,
    json: bool,
) -> Result<()> {
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let (variant, version) = svc.select_variant(&test_id, &task_id)?;
    if json {
        output::print_json(&serde_json::json!({
            "variant": variant.as_str(),
            "version": version,
        }));
    } else {
        println!("{} -> {} (v{version})", task_id, variant.as_str());
    }
    Ok(())
}

pub fn handle_ab_conclude(ctx: &AppContext, test_id: String, json: bool) -> Result<()> {
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let test = svc.conclude(&test_id)?;
    if json {
        output::print_json(&test);
    } else {
        match &test.significance {
            Some(sig) => println!(
                "concluded {}: winner {} (delta {:+.3})",
                test.test_id,
                sig.winner.as_str(),
                sig.delta
            ),
            None => println!("concluded {}: no significant winner", test.test_id),
        }
    }
    Ok(())
}

pub fn handle_record_outcome(
    ctx: &AppContext,
    test_id: String,
    variant: String,
    success: bool,
    json: bool,
) -> Result<()> {
    let variant = match variant.to_lowercase().as_str() {
        "control" => Variant::Control,
        "treatment" => Variant::Treatment,
        other => {
            return Err(CortexError::InvalidInput(format!(
                "unknown variant {other:?}"
            )))
        }
    };
    let svc = PromptRegistryService::new(&ctx.store, &ctx.clock);
    let test = svc.record_ab_outcome(&test_id, variant, success)?;
    if json {
        output::print_json(&test);
    } else {
        println!(
            "recorded {} outcome: control {}/{}, treatment {}/{}",
            variant.as_str(),
            test.control.successes,
            test.control.uses,
            test.treatment.successes,
            test.treatment.uses
        );
    }
    Ok(())
}
