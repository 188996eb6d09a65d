use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use capture::transcode::{compile_glsl, spirv_to_glsl};
use capture::{DumpOutcome, ShaderDigest, ShaderStage, ShaderStore};
use gutsconfig::{ConfigPaths, GutsConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{CompileArgs, ConfigArgs, DecompileArgs, DumpArgs, HashArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn hash(args: HashArgs) -> Result<()> {
    let single = args.files.len() == 1;
    for file in &args.files {
        let bytes = read(file)?;
        let digest = ShaderDigest::of(&bytes);
        if single {
            println!("{digest}");
        } else {
            println!("{digest}  {}", file.display());
        }
    }
    Ok(())
}

pub fn dump(args: DumpArgs) -> Result<()> {
    let bytes = read(&args.file)?;
    let store = ShaderStore::open(&args.root, args.lang)
        .with_context(|| format!("failed to open dump root {}", args.root.display()))?;
    let outcome = store
        .dump(&bytes, args.stage)
        .with_context(|| format!("failed to dump {}", args.file.display()))?;
    match &outcome {
        DumpOutcome::Written(path) => tracing::info!(path = %path.display(), "wrote artifact"),
        DumpOutcome::Existing(path) => {
            tracing::info!(path = %path.display(), "artifact already present")
        }
    }
    println!("{}", outcome.path().display());
    Ok(())
}

pub fn compile(args: CompileArgs) -> Result<()> {
    let stage = match args.stage {
        Some(stage) => stage,
        None => ShaderStage::from_path(&args.file).ok_or_else(|| {
            anyhow!(
                "cannot detect shader stage of {}; use --stage or a .vert/.tesc/.tese/.geom/.frag/.comp extension",
                args.file.display()
            )
        })?,
    };
    let compiler = match args.compiler {
        Some(compiler) => compiler,
        None => GutsConfig::resolve().config.load.compiler,
    };
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let words = compile_glsl(&source, stage, compiler, &args.file.display().to_string())
        .with_context(|| format!("failed to compile {}", args.file.display()))?;

    let output = args.output.unwrap_or_else(|| with_appended_extension(&args.file, "spv"));
    fs::write(&output, bytemuck::cast_slice::<u32, u8>(&words))
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(%stage, %compiler, output = %output.display(), "compiled shader");
    println!("{}  {}", ShaderDigest::of_words(&words), output.display());
    Ok(())
}

pub fn decompile(args: DecompileArgs) -> Result<()> {
    let bytes = read(&args.file)?;
    let glsl = spirv_to_glsl(&bytes)
        .with_context(|| format!("failed to decompile {}", args.file.display()))?;
    match args.output {
        Some(path) => fs::write(&path, glsl)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => io::stdout()
            .write_all(glsl.as_bytes())
            .context("failed to write to stdout")?,
    }
    Ok(())
}

pub fn config(args: ConfigArgs) -> Result<()> {
    let resolved = GutsConfig::resolve();
    if args.json {
        let report = serde_json::json!({
            "source": resolved.source,
            "config": resolved.config,
            "issues": resolved.issues,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &resolved.source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no configuration file; defaults and environment only"),
    }
    for issue in &resolved.issues {
        println!("# ignored {issue}");
    }
    print!(
        "{}",
        resolved
            .config
            .to_toml_string()
            .context("failed to render configuration")?
    );
    Ok(())
}

pub fn show_paths() -> Result<()> {
    let paths = ConfigPaths::discover();
    let show = |path: Option<&Path>| {
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "(unavailable)".to_string())
    };
    println!("Configuration:");
    println!("  dir:   {}", show(paths.config_dir()));
    let file = paths.config_file();
    let status = match file {
        Some(path) if path.is_file() => "present",
        Some(_) => "missing",
        None => "n/a",
    };
    println!("  file:  {} ({status})", show(file));
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}
