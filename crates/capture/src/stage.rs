use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Extension used for binary dumps and raw replacements.
pub const SPIRV_EXTENSION: &str = "spv";

/// Programmable stages that have a dump directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// Directory below the dump root.
    pub fn dir_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VS",
            ShaderStage::TessControl => "TS_Control",
            ShaderStage::TessEvaluation => "TS_evaluation",
            ShaderStage::Geometry => "GS",
            ShaderStage::Fragment => "FS",
            ShaderStage::Compute => "CS",
        }
    }

    pub fn glsl_extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::TessControl => "tesc",
            ShaderStage::TessEvaluation => "tese",
            ShaderStage::Geometry => "geom",
            ShaderStage::Fragment => "frag",
            ShaderStage::Compute => "comp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        ShaderStage::ALL
            .into_iter()
            .find(|stage| stage.glsl_extension().eq_ignore_ascii_case(ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ShaderStage {
    type Err = String;

    /// Accepts the dump directory name, the GLSL extension or the long name.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let long_name = |stage: ShaderStage| match stage {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessControl => "tess-control",
            ShaderStage::TessEvaluation => "tess-evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        ShaderStage::ALL
            .into_iter()
            .find(|stage| {
                stage.dir_name().eq_ignore_ascii_case(trimmed)
                    || stage.glsl_extension().eq_ignore_ascii_case(trimmed)
                    || long_name(*stage).eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| {
                format!("unknown shader stage '{trimmed}'; expected one of VS, TS_Control, TS_evaluation, GS, FS, CS")
            })
    }
}
