/// SamplerCache - internal VkSampler management for the Vulkan backend
///
/// Static samplers of every pipeline are resolved here, so pipelines that
/// declare the same sampler share one VkSampler.

use ash::vk;
use nebula_engine::engine_err;
use nebula_engine::nebula::Result;
use nebula_engine::nebula::device::StaticSampler;
use rustc_hash::FxHashMap;

use crate::vulkan_format::{address_mode_to_vk, compare_op_to_vk, filter_to_vk};

pub(crate) struct SamplerCache {
    cache: FxHashMap<StaticSampler, vk::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new() -> Self {
        Self { cache: FxHashMap::default() }
    }

    /// Get or create the VkSampler for `desc`
    pub(crate) fn get(&mut self, device: &ash::Device, desc: StaticSampler) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&desc) {
            return Ok(sampler);
        }

        let create_info = sampler_create_info(desc);
        let sampler = unsafe { device.create_sampler(&create_info, None) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create sampler {:?}: {:?}", desc, e))?;
        self.cache.insert(desc, sampler);
        Ok(sampler)
    }

    /// Destroy every cached sampler; the device must still be alive
    pub(crate) fn destroy(&mut self, device: &ash::Device) {
        for (_, sampler) in self.cache.drain() {
            unsafe { device.destroy_sampler(sampler, None) };
        }
    }
}

pub(crate) fn sampler_create_info(desc: StaticSampler) -> vk::SamplerCreateInfo<'static> {
    let (filter, mipmap) = filter_to_vk(desc.filter);
    let address = address_mode_to_vk(desc.address_mode);

    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(mipmap)
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .unnormalized_coordinates(false);

    match desc.comparison {
        Some(op) => create_info.compare_enable(true).compare_op(compare_op_to_vk(op)),
        None => create_info.compare_enable(false).compare_op(vk::CompareOp::ALWAYS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_engine::nebula::device::{AddressMode, CompareOp, Filter};

    #[test]
    fn test_linear_wrap_sampler() {
        let info = sampler_create_info(StaticSampler::LINEAR_WRAP);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.compare_enable, vk::FALSE);
    }

    #[test]
    fn test_shadow_comparison_sampler() {
        let info = sampler_create_info(StaticSampler {
            filter: Filter::Linear,
            address_mode: AddressMode::Clamp,
            comparison: Some(CompareOp::LessOrEqual),
        });
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }
}
