//! Conversions between SPIR-V and GLSL.
//!
//! Functions:
//! - `words_from_bytes` re-aligns a byte blob into SPIR-V words.
//! - `glsl_version` finds the mandatory `#version N` pragma.
//! - `compile_glsl` runs the configured front end (shaderc or naga).
//! - `spirv_to_glsl` turns bytecode back into desktop GLSL through naga.
use gutsconfig::ShaderCompiler;
use naga::back::{glsl as glsl_out, spv as spv_out};
use naga::front::{glsl as glsl_in, spv as spv_in};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use tracing::debug;

use crate::stage::ShaderStage;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// GLSL dialect emitted for dumps.
const GLSL_DUMP_VERSION: u16 = 450;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("cannot determine shader stage from extension of '{0}'")]
    UnknownExtension(String),
    #[error("shader source has no '#version' pragma")]
    MissingVersion,
    #[error("SPIR-V blob length {0} is not a multiple of four bytes")]
    Misaligned(usize),
    #[error("{compiler} does not support {stage} shaders")]
    UnsupportedStage {
        compiler: ShaderCompiler,
        stage: ShaderStage,
    },
    #[error("{compiler} failed to compile {name}: {message}")]
    Compile {
        compiler: ShaderCompiler,
        name: String,
        message: String,
    },
    #[error("{0} produced no SPIR-V")]
    EmptyOutput(ShaderCompiler),
    #[error("failed to decompile SPIR-V: {0}")]
    Decompile(String),
}

/// Copies `bytes` into little-endian SPIR-V words.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, TranscodeError> {
    if bytes.len() % 4 != 0 {
        return Err(TranscodeError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Returns the number following the first `#version` directive.
pub fn glsl_version(source: &str) -> Result<u32, TranscodeError> {
    source
        .lines()
        .map(str::trim_start)
        .filter_map(|line| line.strip_prefix('#'))
        .map(str::trim_start)
        .find_map(|directive| directive.strip_prefix("version"))
        .and_then(|rest| {
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .ok_or(TranscodeError::MissingVersion)
}

pub fn compile_glsl(
    source: &str,
    stage: ShaderStage,
    compiler: ShaderCompiler,
    name: &str,
) -> Result<Vec<u32>, TranscodeError> {
    let version = glsl_version(source)?;
    debug!(%compiler, %stage, version, name, "compiling replacement shader");
    let words = match compiler {
        ShaderCompiler::Shaderc => compile_with_shaderc(source, stage, name)?,
        ShaderCompiler::Naga => compile_with_naga(source, stage, name)?,
    };
    if words.is_empty() {
        return Err(TranscodeError::EmptyOutput(compiler));
    }
    Ok(words)
}

#[cfg(feature = "shaderc")]
fn compile_with_shaderc(
    source: &str,
    stage: ShaderStage,
    name: &str,
) -> Result<Vec<u32>, TranscodeError> {
    let failure = |message: String| TranscodeError::Compile {
        compiler: ShaderCompiler::Shaderc,
        name: name.to_string(),
        message,
    };

    let compiler = shaderc::Compiler::new()
        .into_iter()
        .next()
        .ok_or_else(|| failure("unable to initialise shaderc".to_string()))?;
    let mut options = shaderc::CompileOptions::new()
        .into_iter()
        .next()
        .ok_or_else(|| failure("unable to create shaderc options".to_string()))?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );

    let kind = match stage {
        ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
        ShaderStage::TessControl => shaderc::ShaderKind::TessControl,
        ShaderStage::TessEvaluation => shaderc::ShaderKind::TessEvaluation,
        ShaderStage::Geometry => shaderc::ShaderKind::Geometry,
        ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        ShaderStage::Compute => shaderc::ShaderKind::Compute,
    };

    let artifact = compiler
        .compile_into_spirv(source, kind, name, "main", Some(&options))
        .map_err(|err| failure(err.to_string()))?;
    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shaderc"))]
fn compile_with_shaderc(
    _source: &str,
    _stage: ShaderStage,
    name: &str,
) -> Result<Vec<u32>, TranscodeError> {
    Err(TranscodeError::Compile {
        compiler: ShaderCompiler::Shaderc,
        name: name.to_string(),
        message: "built without the `shaderc` feature; use the naga compiler".to_string(),
    })
}

fn compile_with_naga(
    source: &str,
    stage: ShaderStage,
    name: &str,
) -> Result<Vec<u32>, TranscodeError> {
    let failure = |message: String| TranscodeError::Compile {
        compiler: ShaderCompiler::Naga,
        name: name.to_string(),
        message,
    };

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        ShaderStage::Compute => naga::ShaderStage::Compute,
        other => {
            return Err(TranscodeError::UnsupportedStage {
                compiler: ShaderCompiler::Naga,
                stage: other,
            })
        }
    };

    let module = glsl_in::Frontend::default()
        .parse(&glsl_in::Options::from(naga_stage), source)
        .map_err(|err| failure(err.to_string()))?;
    let info = validate(&module).map_err(failure)?;
    spv_out::write_vec(&module, &info, &spv_out::Options::default(), None)
        .map_err(|err| failure(err.to_string()))
}

/// Decompiles SPIR-V into GLSL 450 for the module's first entry point.
pub fn spirv_to_glsl(bytes: &[u8]) -> Result<String, TranscodeError> {
    if bytes.len() % 4 != 0 {
        return Err(TranscodeError::Misaligned(bytes.len()));
    }

    let module = spv_in::parse_u8_slice(bytes, &spv_in::Options::default())
        .map_err(|err| TranscodeError::Decompile(err.to_string()))?;
    let info = validate(&module).map_err(TranscodeError::Decompile)?;
    let entry = module
        .entry_points
        .first()
        .ok_or_else(|| TranscodeError::Decompile("module has no entry point".to_string()))?;

    let options = glsl_out::Options {
        version: glsl_out::Version::Desktop(GLSL_DUMP_VERSION),
        ..glsl_out::Options::default()
    };
    let pipeline_options = glsl_out::PipelineOptions {
        shader_stage: entry.stage,
        entry_point: entry.name.clone(),
        multiview: None,
    };

    let mut output = String::new();
    let mut writer = glsl_out::Writer::new(
        &mut output,
        &module,
        &info,
        &options,
        &pipeline_options,
        naga::proc::BoundsCheckPolicies::default(),
    )
    .map_err(|err| TranscodeError::Decompile(err.to_string()))?;
    writer
        .write()
        .map_err(|err| TranscodeError::Decompile(err.to_string()))?;
    Ok(output)
}

fn validate(module: &naga::Module) -> Result<ModuleInfo, String> {
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(module)
        .map_err(|err| format!("validation failed: {err}"))
}
