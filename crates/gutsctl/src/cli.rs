use std::path::PathBuf;

use capture::ShaderStage;
use clap::{Args, Parser, Subcommand};
use gutsconfig::{ShaderCompiler, ShaderLanguage};

#[derive(Parser, Debug)]
#[command(
    name = "gutsctl",
    author,
    version,
    about = "Inspect and prepare shaders for the VkShaderGUTS layer"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the digest of shader blobs (the value for VK_SHADER_GUTS_LOAD_HASH).
    Hash(HashArgs),
    /// Store a SPIR-V blob in the content-addressed dump layout.
    Dump(DumpArgs),
    /// Compile GLSL to SPIR-V, detecting the stage from the file extension.
    Compile(CompileArgs),
    /// Decompile SPIR-V to GLSL.
    Decompile(DecompileArgs),
    /// Show the configuration the layer would resolve in this environment.
    Config(ConfigArgs),
    /// Show where the configuration file is looked up.
    Where,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Stage directory (VS, TS_Control, TS_evaluation, GS, FS, CS or a GLSL extension).
    #[arg(long, value_name = "STAGE")]
    pub stage: ShaderStage,

    /// Dump root.
    #[arg(long, value_name = "DIR", env = "VK_SHADER_GUTS_DUMP_PATH")]
    pub root: PathBuf,

    /// Artifact representation.
    #[arg(long, value_name = "LANG", default_value_t = ShaderLanguage::Spirv)]
    pub lang: ShaderLanguage,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output path (defaults to `<FILE>.spv`).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// GLSL front end (defaults to the configured compiler).
    #[arg(long, value_name = "COMPILER")]
    pub compiler: Option<ShaderCompiler>,

    /// Override stage detection.
    #[arg(long, value_name = "STAGE")]
    pub stage: Option<ShaderStage>,
}

#[derive(Args, Debug)]
pub struct DecompileArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output path (defaults to stdout).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Emit JSON instead of TOML.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
