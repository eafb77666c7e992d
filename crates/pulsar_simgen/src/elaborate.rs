//! Elaboration: the top-level code-generation pipeline.
//!
//! Runs the pre-passes (arbitration, exposure, callback metadata,
//! dependency order), generates the FFI build units, then writes the
//! simulator crate: `Cargo.toml`, `src/main.rs`, `src/simulator.rs`, and
//! one `src/modules/<Name>.rs` per module. A final `cargo fmt` polish pass
//! is optional and never fatal.

use crate::callbacks;
use crate::error::SimGenError;
use crate::external::{generate_ffi_crates, ExternalFfiSpec};
use crate::lower_expr::LowerCtx;
use crate::modules::{emit_external_drive_file, emit_mod_rs, emit_module_file, is_directly_driven};
use crate::port_map::WritePortArbiter;
use crate::simulator::{emit_simulator, DriverCtx};
use pulsar_config::SimConfig;
use pulsar_ir::analysis::{downstream_topo_order, externally_used_exprs};
use pulsar_ir::System;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn runtime_path(config: &SimConfig) -> PathBuf {
    config.runtime_path.clone().unwrap_or_else(|| {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../pulsar_runtime")
    })
}

fn relative_to(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

fn write_cargo_toml(
    sys: &System,
    config: &SimConfig,
    simulator_path: &Path,
    ffi_specs: &[ExternalFfiSpec],
) -> Result<PathBuf, SimGenError> {
    let crate_name = pulsar_common::sanitize_ident(&format!("{}_simulator", sys.name));
    let runtime = runtime_path(config);
    let mut manifest = format!(
        "[package]\n\
         name = \"{crate_name}\"\n\
         version = \"0.1.0\"\n\
         edition = \"2021\"\n\
         \n\
         [dependencies]\n\
         pulsar_runtime = {{ path = {:?} }}\n",
        runtime.to_string_lossy()
    );
    for spec in ffi_specs {
        manifest.push_str(&format!(
            "{} = {{ path = \"{}\" }}\n",
            spec.crate_name,
            relative_to(&spec.crate_dir, simulator_path)
        ));
    }
    let path = simulator_path.join("Cargo.toml");
    fs::write(&path, manifest)?;
    Ok(path)
}

const MAIN_RS: &str = "//! Generated simulator entry point.\n\n\
                       mod modules;\n\
                       mod simulator;\n\n\
                       fn main() {\n    simulator::simulate();\n}\n";

/// Generates a runnable simulator crate for `sys` under `workspace`.
///
/// Returns the path of the generated crate's `Cargo.toml`. The output
/// directory names come from the config (`<system>_simulator` and
/// `<system>_verilator` by default); a pre-existing output directory is
/// removed first when `override_dump` is set.
pub fn elaborate(
    sys: &System,
    config: &SimConfig,
    workspace: &Path,
) -> Result<PathBuf, SimGenError> {
    config.validate()?;

    let simulator_dirname = config
        .simulator_dirname
        .clone()
        .unwrap_or_else(|| format!("{}_simulator", sys.name));
    let external_dirname = config
        .verilator_dirname
        .clone()
        .unwrap_or_else(|| format!("{}_verilator", sys.name));
    let simulator_path = workspace.join(simulator_dirname);
    let external_root = simulator_path.join(external_dirname);

    if simulator_path.exists() && config.override_dump {
        fs::remove_dir_all(&simulator_path)?;
    }
    fs::create_dir_all(simulator_path.join("src/modules"))?;

    // Pre-passes over the frozen IR: arbitration first (the driver
    // synthesizer sizes array storage from it), then the usage analyses.
    let arbiter = WritePortArbiter::scan(sys);
    let exposed = externally_used_exprs(sys);
    let callbacks = callbacks::collect(sys);
    let topo = downstream_topo_order(sys)?;

    // The bridge generator runs before module emission: its specs type the
    // handle fields the driver synthesizer declares.
    let ffi_specs = generate_ffi_crates(sys, &simulator_path, &external_root)?;

    let lower = LowerCtx {
        sys,
        arbiter: &arbiter,
        exposed: &exposed,
        callbacks,
    };

    let mut module_names = Vec::new();
    for (module_id, module) in sys.modules.iter() {
        let source = if module.is_external() {
            if !is_directly_driven(sys, module_id) {
                // Passthrough stub: behavior lives in consumers' wire glue.
                continue;
            }
            emit_external_drive_file(&lower, module_id)?
        } else {
            emit_module_file(&lower, module_id)?
        };
        let name = sys.module_name(module_id).to_string();
        fs::write(
            simulator_path.join(format!("src/modules/{name}.rs")),
            source,
        )?;
        module_names.push(name);
    }
    fs::write(
        simulator_path.join("src/modules/mod.rs"),
        emit_mod_rs(&module_names),
    )?;

    let driver = DriverCtx {
        lower: &lower,
        config,
        topo: &topo,
        ffi_specs: &ffi_specs,
    };
    fs::write(
        simulator_path.join("src/simulator.rs"),
        emit_simulator(&driver)?,
    )?;
    fs::write(simulator_path.join("src/main.rs"), MAIN_RS)?;

    let manifest_path = write_cargo_toml(sys, config, &simulator_path, &ffi_specs)?;

    if config.format {
        // Polish only: a missing rustfmt must not fail elaboration.
        let result = Command::new("cargo")
            .arg("fmt")
            .arg("--manifest-path")
            .arg(&manifest_path)
            .output();
        match result {
            Ok(output) if output.status.success() => {}
            _ => eprintln!("warning: failed to format generated code with cargo fmt"),
        }
    }

    Ok(manifest_path)
}
