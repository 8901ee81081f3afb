//! Show command implementation.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use vmtest_core::{Assertion, Enablement, ProvisioningSpec};
use vmtest_runner::HarnessConfig;

use super::{OutputFormat, find_unit, load_matrix};

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Unit identity, release/scenario
    pub unit: String,
}

#[derive(Serialize)]
struct Details<'a> {
    unit: String,
    enablement: &'a Enablement,
    spec: &'a ProvisioningSpec,
    script: String,
    assertions: &'a [Assertion],
}

/// Executes the show command.
pub fn execute(args: ShowArgs, config: &HarnessConfig, format: OutputFormat) -> Result<bool> {
    let matrix = load_matrix(config)?;
    let unit = find_unit(&matrix, &args.unit)?;
    let details = Details {
        unit: unit.id().to_string(),
        enablement: unit.enablement(),
        spec: unit.spec(),
        script: unit.scenario().collect.render(&config.backend.guest_output_dir),
        assertions: &unit.scenario().assertions,
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(true);
    }

    let spec = details.spec;
    println!("Unit:        {}", details.unit);
    match details.enablement {
        Enablement::Enabled => println!("State:       enabled"),
        Enablement::Disabled { reason } => println!(
            "State:       disabled ({})",
            reason.as_deref().unwrap_or("no reason given")
        ),
    }
    println!("Image:       {} (boot {})", spec.image.target_release, spec.image.boot_release);
    if let Some(krel) = &spec.image.kernel_release {
        println!("Kernel:      {krel}");
    }
    println!("Config:      {}", spec.conf_file.display());
    println!("Kernel args: {}", spec.kernel_args.join(" "));
    println!(
        "Disks:       driver={} multipath={} extra={:?} nvme={:?}",
        spec.disks.driver.as_deref().unwrap_or("-"),
        spec.disks.multipath,
        spec.disks.extra_disks,
        spec.disks.nvme_disks,
    );
    println!();
    println!("Assertions:");
    for assertion in details.assertions {
        println!("  {}", assertion.name);
    }
    println!();
    println!("Collection script:");
    print!("{}", details.script);
    Ok(true)
}
