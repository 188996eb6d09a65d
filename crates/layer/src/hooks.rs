use std::ffi::c_void;
use std::mem::size_of;
use std::{ptr, slice};
use std::time::{Duration, Instant};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use capture::{Replacement, ShaderStage};
use gutsconfig::CheckpointFunction;
use pipelines::{PipelineHandle, PipelineKind};
use tracing::{debug, warn};

use crate::Instrumentation;

/// Shape of ash's batched creation calls: every output slot on success, or
/// the partially filled slots and the error code.
pub type PipelineBatch<T> = Result<Vec<T>, (Vec<T>, vk::Result)>;

/// Maps a single Vulkan stage bit to its dump stage. Mesh, task and ray
/// tracing stages have none.
pub fn stage_from_flags(flags: vk::ShaderStageFlags) -> Option<ShaderStage> {
    match flags {
        vk::ShaderStageFlags::VERTEX => Some(ShaderStage::Vertex),
        vk::ShaderStageFlags::TESSELLATION_CONTROL => Some(ShaderStage::TessControl),
        vk::ShaderStageFlags::TESSELLATION_EVALUATION => Some(ShaderStage::TessEvaluation),
        vk::ShaderStageFlags::GEOMETRY => Some(ShaderStage::Geometry),
        vk::ShaderStageFlags::FRAGMENT => Some(ShaderStage::Fragment),
        vk::ShaderStageFlags::COMPUTE => Some(ShaderStage::Compute),
        _ => None,
    }
}

/// Copy of a stage whose inline module now points at replacement code. The
/// copied chain links, the boxed module info and the replacement must
/// outlive the forwarded call.
struct StagePatch<'a> {
    stage: vk::PipelineShaderStageCreateInfo<'a>,
    _links: Vec<ChainLink>,
    _module_info: Box<vk::ShaderModuleCreateInfo<'a>>,
    _replacement: Replacement,
}

/// Size of the stage-chain structures that may precede an inline module.
fn chain_link_size(s_type: vk::StructureType) -> Option<usize> {
    let size = match s_type {
        vk::StructureType::PIPELINE_SHADER_STAGE_REQUIRED_SUBGROUP_SIZE_CREATE_INFO => {
            size_of::<vk::PipelineShaderStageRequiredSubgroupSizeCreateInfo<'static>>()
        }
        vk::StructureType::SHADER_MODULE_VALIDATION_CACHE_CREATE_INFO_EXT => {
            size_of::<vk::ShaderModuleValidationCacheCreateInfoEXT<'static>>()
        }
        vk::StructureType::DEBUG_UTILS_OBJECT_NAME_INFO_EXT => {
            size_of::<vk::DebugUtilsObjectNameInfoEXT<'static>>()
        }
        vk::StructureType::PIPELINE_ROBUSTNESS_CREATE_INFO_EXT => {
            size_of::<vk::PipelineRobustnessCreateInfoEXT<'static>>()
        }
        vk::StructureType::PIPELINE_SHADER_STAGE_MODULE_IDENTIFIER_CREATE_INFO_EXT => {
            size_of::<vk::PipelineShaderStageModuleIdentifierCreateInfoEXT<'static>>()
        }
        _ => return None,
    };
    Some(size)
}

/// Owned copy of one `pNext` link, relinkable without touching the caller's
/// structure. Stored as `u64` words to keep Vulkan struct alignment.
struct ChainLink(Box<[u64]>);

impl ChainLink {
    /// # Safety
    /// `base` must point at a valid Vulkan structure.
    unsafe fn copy(base: *const vk::BaseInStructure<'_>) -> Option<Self> {
        let size = chain_link_size((*base).s_type)?;
        let mut storage = vec![0u64; size.div_ceil(size_of::<u64>())].into_boxed_slice();
        ptr::copy_nonoverlapping(base.cast::<u8>(), storage.as_mut_ptr().cast::<u8>(), size);
        Some(Self(storage))
    }

    fn set_next(&mut self, next: *const c_void) {
        let base = self.0.as_mut_ptr().cast::<vk::BaseOutStructure<'static>>();
        // SAFETY: every Vulkan structure starts with `sType` and `pNext`, and
        // the storage holds at least a full structure.
        unsafe { (*base).p_next = next.cast_mut().cast() };
    }

    fn as_ptr(&self) -> *const c_void {
        self.0.as_ptr().cast()
    }
}

/// # Safety
/// `code` must be null or valid for `size` bytes.
unsafe fn code_bytes<'a>(code: *const c_void, size: usize) -> &'a [u8] {
    if code.is_null() || size == 0 {
        return &[];
    }
    slice::from_raw_parts(code.cast::<u8>(), size)
}

/// # Safety
/// `ptr` must be null or valid for `len` elements.
unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    slice::from_raw_parts(ptr, len)
}

/// Finds the first `VkShaderModuleCreateInfo` on a `pNext` chain along with
/// the links that precede it.
///
/// # Safety
/// `p_next` must be null or a valid Vulkan structure chain.
unsafe fn find_inline_module<'a>(
    p_next: *const c_void,
) -> Option<(
    Vec<*const vk::BaseInStructure<'a>>,
    &'a vk::ShaderModuleCreateInfo<'a>,
)> {
    let mut next = p_next.cast::<vk::BaseInStructure<'a>>();
    let mut preceding = Vec::new();
    while let Some(base) = next.as_ref() {
        if base.s_type == vk::StructureType::SHADER_MODULE_CREATE_INFO {
            // SAFETY: the structure type identifies the concrete struct.
            return Some((preceding, &*next.cast::<vk::ShaderModuleCreateInfo<'a>>()));
        }
        preceding.push(next);
        next = base.p_next;
    }
    None
}

fn elapsed_ms(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32() * 1000.0
}

impl Instrumentation {
    /// Gates `site` and forwards. Used for entry points that only act as
    /// checkpoints (`vkCreateInstance`, `vkCreateDevice`).
    pub fn checkpoint<F, T>(&self, site: CheckpointFunction, forward: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.playback.gate(site);
        forward()
    }

    /// `vkCreateShaderModule`: substitutes the configured replacement and
    /// caches the forwarded code under the new module handle.
    ///
    /// # Safety
    /// `info` must satisfy Vulkan's valid usage for `vkCreateShaderModule`.
    pub unsafe fn create_shader_module<'a, F>(
        &self,
        info: &vk::ShaderModuleCreateInfo<'a>,
        forward: F,
    ) -> VkResult<vk::ShaderModule>
    where
        F: FnOnce(&vk::ShaderModuleCreateInfo<'a>) -> VkResult<vk::ShaderModule>,
    {
        self.playback.gate(CheckpointFunction::CreateShaderModule);

        // SAFETY: valid usage requires `pCode` to hold `codeSize` bytes.
        let code = code_bytes(info.p_code.cast(), info.code_size);
        let replacement = self.capture.load(code);
        let mut patched = *info;
        if let Some(replacement) = &replacement {
            patched.p_code = replacement.as_ptr();
            patched.code_size = replacement.byte_len();
        }

        let result = forward(&patched);
        if let Ok(module) = result {
            let forwarded = replacement.as_ref().map_or(code, Replacement::as_bytes);
            self.capture.remember_module(module.as_raw(), forwarded);
        }
        result
    }

    /// `vkCreateGraphicsPipelines`: dumps every stage, injects into inline
    /// modules and records one pipeline per output slot.
    ///
    /// # Safety
    /// `infos` must satisfy Vulkan's valid usage for
    /// `vkCreateGraphicsPipelines`.
    pub unsafe fn create_graphics_pipelines<'a, F>(
        &self,
        infos: &[vk::GraphicsPipelineCreateInfo<'a>],
        forward: F,
    ) -> PipelineBatch<vk::Pipeline>
    where
        F: FnOnce(&[vk::GraphicsPipelineCreateInfo<'a>]) -> PipelineBatch<vk::Pipeline>,
    {
        self.playback.gate(CheckpointFunction::CreateGraphicsPipelines);

        let mut patched_infos = infos.to_vec();
        let mut stage_arrays = Vec::new();
        let mut patches = Vec::new();
        for info in &mut patched_infos {
            // SAFETY: `pStages` holds `stageCount` entries.
            let stages = slice_or_empty(info.p_stages, info.stage_count as usize);
            let mut replaced: Option<Vec<vk::PipelineShaderStageCreateInfo<'a>>> = None;
            for (slot, stage) in stages.iter().enumerate() {
                if let Some(patch) = self.inspect_stage(stage) {
                    replaced.get_or_insert_with(|| stages.to_vec())[slot] = patch.stage;
                    patches.push(patch);
                }
            }
            if let Some(array) = replaced {
                info.p_stages = array.as_ptr();
                stage_arrays.push(array);
            }
        }

        let started = Instant::now();
        let outcome = forward(&patched_infos);
        self.record_batch(PipelineKind::Graphics, started.elapsed(), &outcome);
        drop(stage_arrays);
        drop(patches);
        outcome
    }

    /// `vkCreateComputePipelines`.
    ///
    /// # Safety
    /// `infos` must satisfy Vulkan's valid usage for
    /// `vkCreateComputePipelines`.
    pub unsafe fn create_compute_pipelines<'a, F>(
        &self,
        infos: &[vk::ComputePipelineCreateInfo<'a>],
        forward: F,
    ) -> PipelineBatch<vk::Pipeline>
    where
        F: FnOnce(&[vk::ComputePipelineCreateInfo<'a>]) -> PipelineBatch<vk::Pipeline>,
    {
        self.playback.gate(CheckpointFunction::CreateComputePipelines);

        let mut patched_infos = infos.to_vec();
        let mut patches = Vec::new();
        for info in &mut patched_infos {
            if let Some(patch) = self.inspect_stage(&info.stage) {
                info.stage = patch.stage;
                patches.push(patch);
            }
        }

        let started = Instant::now();
        let outcome = forward(&patched_infos);
        self.record_batch(PipelineKind::Compute, started.elapsed(), &outcome);
        drop(patches);
        outcome
    }

    /// `vkCreateShadersEXT`: SPIR-V shader objects are dumped, are load
    /// candidates and are recorded as `ShaderObject` pipelines.
    ///
    /// # Safety
    /// `infos` must satisfy Vulkan's valid usage for `vkCreateShadersEXT`.
    pub unsafe fn create_shaders_ext<'a, F>(
        &self,
        infos: &[vk::ShaderCreateInfoEXT<'a>],
        forward: F,
    ) -> PipelineBatch<vk::ShaderEXT>
    where
        F: FnOnce(&[vk::ShaderCreateInfoEXT<'a>]) -> PipelineBatch<vk::ShaderEXT>,
    {
        self.playback.gate(CheckpointFunction::CreateShadersExt);

        let mut patched_infos = infos.to_vec();
        let mut replacements = Vec::new();
        for info in &mut patched_infos {
            if info.code_type != vk::ShaderCodeTypeEXT::SPIRV {
                continue;
            }
            // SAFETY: valid usage requires `pCode` to hold `codeSize` bytes.
            let code = code_bytes(info.p_code, info.code_size);
            if let Some(stage) = stage_from_flags(info.stage) {
                self.capture.dump(code, stage);
            }
            if let Some(replacement) = self.capture.load(code) {
                info.p_code = replacement.as_ptr().cast();
                info.code_size = replacement.byte_len();
                replacements.push(replacement);
            }
        }

        let started = Instant::now();
        let outcome = forward(&patched_infos);
        self.record_batch(PipelineKind::ShaderObject, started.elapsed(), &outcome);
        drop(replacements);
        outcome
    }

    /// `vkCmdBindPipeline`.
    pub fn cmd_bind_pipeline<F, T>(&self, pipeline: vk::Pipeline, forward: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.playback.gate(CheckpointFunction::CmdBindPipeline);
        self.library.mark_used(PipelineHandle(pipeline.as_raw()));
        forward()
    }

    /// `vkAcquireNextImageKHR`: opens a new frame window.
    pub fn acquire_next_image<F, T>(&self, forward: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.playback.gate(CheckpointFunction::AcquireNextImage);
        self.library.reset_used();
        forward()
    }

    /// `vkQueuePresentKHR`: closes the frame window once the driver returns.
    pub fn queue_present<F, T>(&self, forward: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.playback.gate(CheckpointFunction::QueuePresent);
        let result = forward();
        self.library.end_of_frame();
        let frame = self.playback.frame_presented();
        debug!(frame, "frame presented");
        result
    }

    /// Dumps one pipeline stage and, for inline modules, returns a patched
    /// copy when the code is the injection target.
    ///
    /// # Safety
    /// `stage` must be a valid `VkPipelineShaderStageCreateInfo`.
    unsafe fn inspect_stage<'a>(
        &self,
        stage: &vk::PipelineShaderStageCreateInfo<'a>,
    ) -> Option<StagePatch<'a>> {
        let dump_stage = stage_from_flags(stage.stage);

        if stage.module != vk::ShaderModule::null() {
            if let Some(dump_stage) = dump_stage {
                self.capture.dump_module(stage.module.as_raw(), dump_stage);
            }
            return None;
        }

        let (preceding, module_info) = find_inline_module(stage.p_next)?;
        // SAFETY: valid usage requires `pCode` to hold `codeSize` bytes.
        let code = code_bytes(module_info.p_code.cast(), module_info.code_size);
        if let Some(dump_stage) = dump_stage {
            self.capture.dump(code, dump_stage);
        }

        let replacement = self.capture.load(code)?;

        let mut links = Vec::with_capacity(preceding.len());
        for base in preceding {
            match ChainLink::copy(base) {
                Some(link) => links.push(link),
                None => {
                    warn!(
                        s_type = ?(*base).s_type,
                        "shader injection skipped: unknown structure ahead of inline module"
                    );
                    return None;
                }
            }
        }

        let mut module_info = Box::new(*module_info);
        module_info.p_code = replacement.as_ptr();
        module_info.code_size = replacement.byte_len();
        let mut next = (&*module_info as *const vk::ShaderModuleCreateInfo<'a>).cast::<c_void>();
        for link in links.iter_mut().rev() {
            link.set_next(next);
            next = link.as_ptr();
        }
        let mut patched = *stage;
        patched.p_next = next;
        Some(StagePatch {
            stage: patched,
            _links: links,
            _module_info: module_info,
            _replacement: replacement,
        })
    }

    fn record_batch<H: Handle + Copy>(
        &self,
        kind: PipelineKind,
        elapsed: Duration,
        outcome: &PipelineBatch<H>,
    ) {
        let (handles, succeeded) = match outcome {
            Ok(handles) => (handles, true),
            Err((handles, _)) => (handles, false),
        };
        let duration_ms = elapsed_ms(elapsed);
        for handle in handles {
            let raw = handle.as_raw();
            self.library
                .add_pipeline(kind, duration_ms, succeeded && raw != 0, PipelineHandle(raw));
        }
    }
}
