//! External-hardware FFI bridge generation.
//!
//! Each externally-implemented module becomes an isolated build unit: the
//! copied hardware source, a `build.rs` recipe that runs Verilator and
//! links the compiled model plus a thin C wrapper into one shared library,
//! the wrapper itself, and a typed Rust handle. Symbol prefixes combine a
//! per-top-module counter with a hash of the source path and instance
//! name, so several instances of one hardware block never collide.
//! A JSON manifest describing every generated module is written next to
//! the simulator crate for downstream tooling.

use crate::error::SimGenError;
use crate::lower_expr::ffi_storage_type;
use crate::render::CodeWriter;
use pulsar_common::{sanitize_ident, SymbolHash};
use pulsar_ir::{ModuleId, System, WireDirection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const BUILD_RS_TEMPLATE: &str = include_str!("templates/external_build.rs.in");

/// One wire of an external module, as seen by the FFI layer.
#[derive(Debug, Clone, Serialize)]
pub struct FfiPort {
    /// The sanitized port name.
    pub name: String,
    /// Declared bit width.
    pub bits: u32,
    /// Whether the IR type is signed.
    pub signed: bool,
    /// The C storage type crossing the boundary.
    pub c_type: &'static str,
    /// The Rust storage type crossing the boundary.
    pub rust_type: &'static str,
}

/// Everything generated for one external module.
#[derive(Debug, Clone)]
pub struct ExternalFfiSpec {
    /// The IR module this spec backs.
    pub module: ModuleId,
    /// The generated crate's name.
    pub crate_name: String,
    /// The generated crate's directory.
    pub crate_dir: PathBuf,
    /// The C symbol prefix of every entry point.
    pub symbol_prefix: String,
    /// The shared library name (without `lib`/suffix).
    pub dynamic_lib: String,
    /// The Rust handle type exported by the crate.
    pub struct_name: String,
    /// The hardware top module name.
    pub top_module: String,
    /// The copied hardware source file name.
    pub hw_filename: String,
    /// Input wires in declaration order.
    pub inputs: Vec<FfiPort>,
    /// Output wires in declaration order.
    pub outputs: Vec<FfiPort>,
    /// Whether clock sequencing helpers are generated.
    pub has_clock: bool,
    /// Whether reset sequencing helpers are generated.
    pub has_reset: bool,
}

fn camelize(name: &str) -> String {
    let mut out = String::new();
    let mut upper = true;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn ffi_port(sys: &System, wire: pulsar_ir::WireId) -> Result<FfiPort, SimGenError> {
    let w = &sys.wires[wire];
    let name = sanitize_ident(sys.resolve(w.name));
    let bits = w.dtype.bits();
    let signed = w.dtype.is_signed();
    let rust_type = ffi_storage_type(bits, signed, &format!("wire {name}"))?;
    let c_type = match rust_type {
        "u8" => "uint8_t",
        "u16" => "uint16_t",
        "u32" => "uint32_t",
        "u64" => "uint64_t",
        "i8" => "int8_t",
        "i16" => "int16_t",
        "i32" => "int32_t",
        _ => "int64_t",
    };
    Ok(FfiPort {
        name,
        bits,
        signed,
        c_type,
        rust_type,
    })
}

fn gen_cargo_toml(spec: &ExternalFfiSpec) -> String {
    format!(
        "[package]\n\
         name = \"{}\"\n\
         version = \"0.1.0\"\n\
         edition = \"2021\"\n\
         links = \"{}\"\n\
         \n\
         [dependencies]\n\
         \n\
         [build-dependencies]\n\
         cc = \"1\"\n",
        spec.crate_name, spec.dynamic_lib
    )
}

fn gen_build_rs(spec: &ExternalFfiSpec) -> String {
    let aggregated = format!("V{}__ALL.cpp", spec.top_module);
    BUILD_RS_TEMPLATE
        .replace("__HW_PATH__", &format!("rtl/{}", spec.hw_filename))
        .replace("__TOP_MODULE__", &spec.top_module)
        .replace("__AGGREGATED__", &aggregated)
        .replace("__DYNLIB__", &spec.dynamic_lib)
}

fn gen_lib_rs(spec: &ExternalFfiSpec) -> String {
    let prefix = &spec.symbol_prefix;
    let name = &spec.struct_name;
    let mut w = CodeWriter::new();
    w.line("//! Typed handle over the compiled hardware model.");
    w.line("#![allow(dead_code)]");
    w.blank();
    w.line("/// Opaque handle to the compiled model instance.");
    w.line("#[repr(C)]");
    w.line("pub struct ModelHandle {");
    w.line("    _private: [u8; 0],");
    w.line("}");
    w.blank();
    w.line("pub mod raw {");
    w.line("    use super::ModelHandle;");
    w.blank();
    w.line("    extern \"C\" {");
    w.line(&format!("        pub fn {prefix}_new() -> *mut ModelHandle;"));
    w.line(&format!("        pub fn {prefix}_free(handle: *mut ModelHandle);"));
    w.line(&format!("        pub fn {prefix}_eval(handle: *mut ModelHandle);"));
    if spec.has_clock {
        w.line(&format!(
            "        pub fn {prefix}_set_clk(handle: *mut ModelHandle, value: u8);"
        ));
    }
    if spec.has_reset {
        w.line(&format!(
            "        pub fn {prefix}_set_rst(handle: *mut ModelHandle, value: u8);"
        ));
    }
    for port in &spec.inputs {
        w.line(&format!(
            "        pub fn {prefix}_set_{}(handle: *mut ModelHandle, value: {});",
            port.name, port.rust_type
        ));
    }
    for port in &spec.outputs {
        w.line(&format!(
            "        pub fn {prefix}_get_{}(handle: *mut ModelHandle) -> {};",
            port.name, port.rust_type
        ));
    }
    w.line("    }");
    w.line("}");
    w.blank();
    w.line("/// Safe wrapper owning one model instance.");
    w.line(&format!("pub struct {name} {{"));
    w.line("    ptr: *mut ModelHandle,");
    w.line("}");
    w.blank();
    w.line(&format!("impl {name} {{"));
    w.line("    pub fn new() -> Self {");
    w.line(&format!("        let ptr = unsafe {{ raw::{prefix}_new() }};"));
    w.line(&format!(
        "        assert!(!ptr.is_null(), \"{prefix}_new returned null\");"
    ));
    if spec.has_clock {
        w.line(&format!("        unsafe {{ raw::{prefix}_set_clk(ptr, 0) }};"));
    }
    if spec.has_reset {
        w.line(&format!("        unsafe {{ raw::{prefix}_set_rst(ptr, 0) }};"));
    }
    w.line("        Self { ptr }");
    w.line("    }");
    w.blank();
    w.line("    pub fn eval(&mut self) {");
    w.line(&format!("        unsafe {{ raw::{prefix}_eval(self.ptr) }}"));
    w.line("    }");
    if spec.has_clock {
        w.blank();
        w.line("    pub fn set_clock(&mut self, value: bool) {");
        w.line(&format!(
            "        unsafe {{ raw::{prefix}_set_clk(self.ptr, value as u8) }};"
        ));
        w.line("    }");
        w.blank();
        w.line("    /// One full clock period: falling edge, then rising edge.");
        w.line("    pub fn clock_tick(&mut self) {");
        w.line("        self.set_clock(false);");
        w.line("        self.eval();");
        w.line("        self.set_clock(true);");
        w.line("        self.eval();");
        w.line("    }");
    }
    if spec.has_reset {
        w.blank();
        w.line("    pub fn set_reset(&mut self, value: bool) {");
        w.line(&format!(
            "        unsafe {{ raw::{prefix}_set_rst(self.ptr, value as u8) }};"
        ));
        w.line("    }");
        w.blank();
        w.line("    /// Holds reset for the given number of cycles, then releases it.");
        w.line("    pub fn apply_reset(&mut self, cycles: usize) {");
        w.line("        self.set_reset(true);");
        if spec.has_clock {
            w.line("        for _ in 0..cycles.max(1) {");
            w.line("            self.clock_tick();");
            w.line("        }");
            w.line("        self.set_reset(false);");
            w.line("        self.clock_tick();");
        } else {
            w.line("        let _ = cycles;");
            w.line("        self.eval();");
            w.line("        self.set_reset(false);");
            w.line("        self.eval();");
        }
        w.line("    }");
    }
    for port in &spec.inputs {
        w.blank();
        w.line(&format!(
            "    pub fn set_{}(&mut self, value: {}) {{",
            port.name, port.rust_type
        ));
        w.line(&format!(
            "        unsafe {{ raw::{prefix}_set_{}(self.ptr, value) }}",
            port.name
        ));
        w.line("    }");
    }
    for port in &spec.outputs {
        w.blank();
        w.line(&format!(
            "    pub fn get_{}(&mut self) -> {} {{",
            port.name, port.rust_type
        ));
        w.line(&format!(
            "        unsafe {{ raw::{prefix}_get_{}(self.ptr) }}",
            port.name
        ));
        w.line("    }");
    }
    w.line("}");
    w.blank();
    w.line(&format!("impl Default for {name} {{"));
    w.line("    fn default() -> Self {");
    w.line("        Self::new()");
    w.line("    }");
    w.line("}");
    w.blank();
    w.line(&format!("impl Drop for {name} {{"));
    w.line("    fn drop(&mut self) {");
    w.line(&format!("        unsafe {{ raw::{prefix}_free(self.ptr) }}"));
    w.line("    }");
    w.line("}");
    w.finish()
}

fn gen_wrapper_cpp(spec: &ExternalFfiSpec) -> String {
    let cpp_class = format!("V{}", spec.top_module);
    let prefix = &spec.symbol_prefix;
    let mut lines = vec![
        format!("#include \"{cpp_class}.h\""),
        "#include \"verilated.h\"".to_string(),
        "#include <cstdint>".to_string(),
        String::new(),
        "double sc_time_stamp() { return 0.0; }".to_string(),
        String::new(),
        "extern \"C\" {".to_string(),
        String::new(),
        format!("using ModelHandle = {cpp_class};"),
        String::new(),
        format!("ModelHandle* {prefix}_new() {{"),
        "    static bool inited = false;".to_string(),
        "    if (!inited) { Verilated::debug(0); inited = true; }".to_string(),
        "    return new ModelHandle();".to_string(),
        "}".to_string(),
        String::new(),
        format!("void {prefix}_free(ModelHandle* handle) {{ delete handle; }}"),
        String::new(),
        format!("void {prefix}_eval(ModelHandle* handle) {{ handle->eval(); }}"),
    ];
    if spec.has_clock {
        lines.push(format!(
            "void {prefix}_set_clk(ModelHandle* handle, uint8_t value) {{"
        ));
        lines.push("    handle->clk = static_cast<uint8_t>(value & 0x1U);".to_string());
        lines.push("}".to_string());
    }
    if spec.has_reset {
        lines.push(format!(
            "void {prefix}_set_rst(ModelHandle* handle, uint8_t value) {{"
        ));
        lines.push("    handle->rst = static_cast<uint8_t>(value & 0x1U);".to_string());
        lines.push("}".to_string());
    }
    for port in &spec.inputs {
        lines.push(format!(
            "void {prefix}_set_{}(ModelHandle* handle, {} value) {{",
            port.name, port.c_type
        ));
        lines.push(format!(
            "    handle->{} = static_cast<{}>(value);",
            port.name, port.c_type
        ));
        lines.push("}".to_string());
    }
    for port in &spec.outputs {
        lines.push(format!(
            "{} {prefix}_get_{}(ModelHandle* handle) {{",
            port.c_type, port.name
        ));
        lines.push(format!(
            "    return static_cast<{}>(handle->{});",
            port.c_type, port.name
        ));
        lines.push("}".to_string());
    }
    lines.push("}".to_string());
    lines.join("\n") + "\n"
}

#[derive(Serialize)]
struct ManifestModule<'a> {
    crate_name: &'a str,
    dynamic_lib: &'a str,
    top_module: &'a str,
    hw_source: &'a str,
    crate_dir: String,
    struct_name: &'a str,
    has_clock: bool,
    has_reset: bool,
    inputs: &'a [FfiPort],
    outputs: &'a [FfiPort],
    original_module_name: &'a str,
}

#[derive(Serialize)]
struct Manifest<'a> {
    modules: Vec<ManifestModule<'a>>,
}

fn write_manifest(
    sys: &System,
    specs: &[ExternalFfiSpec],
    simulator_dir: &Path,
) -> Result<(), SimGenError> {
    let manifest = Manifest {
        modules: specs
            .iter()
            .map(|spec| ManifestModule {
                crate_name: &spec.crate_name,
                dynamic_lib: &spec.dynamic_lib,
                top_module: &spec.top_module,
                hw_source: &spec.hw_filename,
                crate_dir: pathdiff(&spec.crate_dir, simulator_dir),
                struct_name: &spec.struct_name,
                has_clock: spec.has_clock,
                has_reset: spec.has_reset,
                inputs: &spec.inputs,
                outputs: &spec.outputs,
                original_module_name: sys.module_name(spec.module),
            })
            .collect(),
    };
    let path = simulator_dir.join("external_modules.json");
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}

/// Best-effort relative spelling of `path` from `base`.
fn pathdiff(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// Generates one FFI build unit per external module, plus the manifest.
///
/// Build units land under `external_root`; the manifest lands next to the
/// simulator crate at `simulator_dir/external_modules.json` when any
/// external module exists.
pub fn generate_ffi_crates(
    sys: &System,
    simulator_dir: &Path,
    external_root: &Path,
) -> Result<Vec<ExternalFfiSpec>, SimGenError> {
    let externals = sys.external_modules();
    if externals.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(external_root)?;

    let mut used_crate_names: BTreeMap<String, usize> = BTreeMap::new();
    let mut specs = Vec::new();

    for module in externals {
        let spec_ir = sys.modules[module]
            .external
            .as_ref()
            .expect("external modules carry a spec");
        let module_name = sys.module_name(module).to_string();
        if spec_ir.top_module.is_empty() {
            return Err(SimGenError::MissingTopModule {
                module: module_name,
            });
        }
        if !spec_ir.source.exists() {
            return Err(SimGenError::ExternalSourceMissing {
                module: module_name,
                path: spec_ir.source.clone(),
            });
        }

        let base = sanitize_ident(&spec_ir.top_module);
        let mut crate_name = format!("verilated_{base}");
        let count = used_crate_names.entry(crate_name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            crate_name = format!("{crate_name}_{count}");
        }

        let hash = SymbolHash::from_parts(&[&spec_ir.source.to_string_lossy(), &module_name]);
        let symbol_prefix = format!("{crate_name}_{}", hash.short_hex());
        let dynamic_lib = format!("{symbol_prefix}_ffi");
        let struct_name = camelize(&crate_name);

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for &wire in &spec_ir.wires {
            let port = ffi_port(sys, wire)?;
            match sys.wires[wire].direction {
                WireDirection::Input => inputs.push(port),
                WireDirection::Output => outputs.push(port),
            }
        }

        let crate_dir = external_root.join(&crate_name);
        fs::create_dir_all(crate_dir.join("src"))?;
        fs::create_dir_all(crate_dir.join("rtl"))?;

        let hw_filename = spec_ir
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "top.sv".to_string());
        fs::copy(&spec_ir.source, crate_dir.join("rtl").join(&hw_filename))?;

        let spec = ExternalFfiSpec {
            module,
            crate_name,
            crate_dir,
            symbol_prefix,
            dynamic_lib,
            struct_name,
            top_module: spec_ir.top_module.clone(),
            hw_filename,
            inputs,
            outputs,
            has_clock: spec_ir.has_clock,
            has_reset: spec_ir.has_reset,
        };

        fs::write(spec.crate_dir.join("Cargo.toml"), gen_cargo_toml(&spec))?;
        fs::write(spec.crate_dir.join("build.rs"), gen_build_rs(&spec))?;
        fs::write(spec.crate_dir.join("src/lib.rs"), gen_lib_rs(&spec))?;
        fs::write(spec.crate_dir.join("src/wrapper.cpp"), gen_wrapper_cpp(&spec))?;

        specs.push(spec);
    }

    write_manifest(sys, &specs, simulator_dir)?;
    Ok(specs)
}

/// Looks up the spec of a module, if it is external.
pub fn spec_for<'a>(specs: &'a [ExternalFfiSpec], module: ModuleId) -> Option<&'a ExternalFfiSpec> {
    specs.iter().find(|s| s.module == module)
}

/// The generated handle's fully-qualified type for a simulator field.
pub fn handle_type(spec: &ExternalFfiSpec) -> String {
    format!("{}::{}", spec.crate_name, spec.struct_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_ir::DataType;
    use std::io::Write as _;

    fn system_with_external(dir: &Path) -> (System, ModuleId) {
        let hw = dir.join("alu.sv");
        let mut f = fs::File::create(&hw).unwrap();
        writeln!(f, "module alu(input [7:0] a, output [7:0] y); endmodule").unwrap();
        let mut sys = System::new("ext");
        let m = sys.add_external_module("Alu", &hw, "alu", true, true);
        sys.add_wire(m, "a", DataType::UInt(8), WireDirection::Input);
        sys.add_wire(m, "y", DataType::UInt(8), WireDirection::Output);
        (sys, m)
    }

    #[test]
    fn generates_a_complete_build_unit() {
        let tmp = tempfile::tempdir().unwrap();
        let sim_dir = tmp.path().join("sim");
        let ext_dir = sim_dir.join("ext");
        fs::create_dir_all(&sim_dir).unwrap();
        let (sys, _) = system_with_external(tmp.path());

        let specs = generate_ffi_crates(&sys, &sim_dir, &ext_dir).unwrap();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.crate_name, "verilated_alu");
        for file in ["Cargo.toml", "build.rs", "src/lib.rs", "src/wrapper.cpp", "rtl/alu.sv"] {
            assert!(spec.crate_dir.join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn entry_points_cover_the_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();
        let (sys, _) = system_with_external(tmp.path());
        let specs = generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap();
        let spec = &specs[0];

        let wrapper = fs::read_to_string(spec.crate_dir.join("src/wrapper.cpp")).unwrap();
        let prefix = &spec.symbol_prefix;
        for entry in ["_new", "_free", "_eval", "_set_clk", "_set_rst", "_set_a", "_get_y"] {
            assert!(
                wrapper.contains(&format!("{prefix}{entry}")),
                "wrapper missing {entry}"
            );
        }

        let lib = fs::read_to_string(spec.crate_dir.join("src/lib.rs")).unwrap();
        assert!(lib.contains("pub fn clock_tick"));
        assert!(lib.contains("pub fn apply_reset"));
        assert!(lib.contains("pub fn set_a(&mut self, value: u8)"));
        assert!(lib.contains("pub fn get_y(&mut self) -> u8"));
    }

    #[test]
    fn build_recipe_names_the_toolchain() {
        let tmp = tempfile::tempdir().unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();
        let (sys, _) = system_with_external(tmp.path());
        let specs = generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap();
        let build = fs::read_to_string(specs[0].crate_dir.join("build.rs")).unwrap();
        assert!(build.contains("--top-module"));
        assert!(build.contains("\"alu\""));
        assert!(build.contains("rtl/alu.sv"));
        assert!(build.contains(&specs[0].dynamic_lib));
        assert!(!build.contains("__HW_PATH__"));
    }

    #[test]
    fn manifest_lists_ports_and_widths() {
        let tmp = tempfile::tempdir().unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();
        let (sys, _) = system_with_external(tmp.path());
        generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sim_dir.join("external_modules.json")).unwrap())
                .unwrap();
        let module = &manifest["modules"][0];
        assert_eq!(module["top_module"], "alu");
        assert_eq!(module["original_module_name"], "Alu");
        assert_eq!(module["inputs"][0]["name"], "a");
        assert_eq!(module["inputs"][0]["bits"], 8);
        assert_eq!(module["outputs"][0]["rust_type"], "u8");
    }

    #[test]
    fn duplicate_top_modules_get_distinct_names() {
        let tmp = tempfile::tempdir().unwrap();
        let hw = tmp.path().join("alu.sv");
        fs::write(&hw, "module alu(); endmodule").unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();

        let mut sys = System::new("dup");
        sys.add_external_module("AluA", &hw, "alu", false, false);
        sys.add_external_module("AluB", &hw, "alu", false, false);
        let specs = generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap();
        assert_eq!(specs.len(), 2);
        assert_ne!(specs[0].crate_name, specs[1].crate_name);
        assert_ne!(specs[0].symbol_prefix, specs[1].symbol_prefix);
        assert_ne!(specs[0].dynamic_lib, specs[1].dynamic_lib);
    }

    #[test]
    fn missing_source_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();
        let mut sys = System::new("bad");
        sys.add_external_module("Gone", tmp.path().join("missing.sv"), "gone", false, false);
        let err = generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap_err();
        assert!(matches!(err, SimGenError::ExternalSourceMissing { .. }));
    }

    #[test]
    fn wide_wires_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let hw = tmp.path().join("wide.sv");
        fs::write(&hw, "module wide(); endmodule").unwrap();
        let sim_dir = tmp.path().join("sim");
        fs::create_dir_all(&sim_dir).unwrap();
        let mut sys = System::new("wide");
        let m = sys.add_external_module("Wide", &hw, "wide", false, false);
        sys.add_wire(m, "big", DataType::UInt(128), WireDirection::Input);
        let err = generate_ffi_crates(&sys, &sim_dir, &sim_dir.join("ext")).unwrap_err();
        assert!(matches!(err, SimGenError::UnsupportedWidth { bits: 128, .. }));
    }
}
