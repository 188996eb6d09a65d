use std::fs;

use capture::{DumpOutcome, ShaderCapture, ShaderDigest, ShaderStage};
use gutsconfig::{GutsConfig, ShaderLanguage};

fn fragment_blob() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0x0008_000b, 12, 0, 0x0002_0011, 1]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

#[test]
fn dumped_fragment_blob_loads_back_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let blob = fragment_blob();
    let digest = ShaderDigest::of(&blob);

    let mut dump_config = GutsConfig::default();
    dump_config.dump.path = Some(dir.path().join("dumps"));
    let dumper = ShaderCapture::from_config(&dump_config);
    let artifact = match dumper.dump(&blob, ShaderStage::Fragment) {
        Some(DumpOutcome::Written(path)) => path,
        other => panic!("expected a fresh dump, got {other:?}"),
    };
    assert_eq!(
        artifact,
        dir.path().join("dumps/FS").join(format!("{digest}.spv"))
    );

    let mut load_config = GutsConfig::default();
    load_config.load.path = Some(artifact);
    load_config.load.hash = Some(digest.to_hex());
    load_config.load.language = ShaderLanguage::Spirv;
    let loader = ShaderCapture::from_config(&load_config);
    assert!(loader.load_enabled());

    let replacement = loader.load(&blob).expect("digest should match");
    assert_eq!(replacement.as_bytes(), blob.as_slice());
    assert_eq!(replacement.byte_len(), blob.len());
    assert_eq!(replacement.digest(), digest);
}

#[test]
fn dump_is_deduplicated_across_captures() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GutsConfig::default();
    config.dump.path = Some(dir.path().to_path_buf());
    let blob = fragment_blob();

    let first = ShaderCapture::from_config(&config);
    assert!(matches!(
        first.dump(&blob, ShaderStage::Fragment),
        Some(DumpOutcome::Written(_))
    ));
    let second = ShaderCapture::from_config(&config);
    assert!(matches!(
        second.dump(&blob, ShaderStage::Fragment),
        Some(DumpOutcome::Existing(_))
    ));

    let entries = fs::read_dir(dir.path().join("FS")).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn glsl_dump_writes_stage_extension() {
    let dir = tempfile::tempdir().unwrap();
    let source = "#version 450\nlayout(location = 0) out vec4 color;\nvoid main() { color = vec4(0.25); }\n";
    let words = capture::transcode::compile_glsl(
        source,
        ShaderStage::Fragment,
        gutsconfig::ShaderCompiler::Naga,
        "seed.frag",
    )
    .unwrap();
    let blob: Vec<u8> = bytemuck::cast_slice(&words).to_vec();

    let mut config = GutsConfig::default();
    config.dump.path = Some(dir.path().to_path_buf());
    config.dump.language = ShaderLanguage::Glsl;
    let dumper = ShaderCapture::from_config(&config);
    let artifact = dumper
        .dump(&blob, ShaderStage::Fragment)
        .expect("dump")
        .path()
        .to_path_buf();

    assert_eq!(artifact.extension().and_then(|e| e.to_str()), Some("frag"));
    let text = fs::read_to_string(&artifact).unwrap();
    assert!(text.contains("void main()"));
}
