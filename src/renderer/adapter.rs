//! 适配器选择
//!
//! 硬件路径：跳过软件适配器和不支持最低特性等级的适配器，
//! 在剩余适配器中选择独占显存最大的一个；显存相同时保留先枚举到的。
//! 软件路径：直接使用 WARP。

use tracing::{debug, info};

use crate::core::config::{FeatureLevel, GraphicsConfig};
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{AdapterCandidate, GraphicsBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSelector {
    prefer_software: bool,
    min_feature_level: FeatureLevel,
}

impl AdapterSelector {
    pub fn new(prefer_software: bool, min_feature_level: FeatureLevel) -> Self {
        Self { prefer_software, min_feature_level }
    }

    pub fn from_config(config: &GraphicsConfig) -> Self {
        Self::new(config.prefer_software_adapter, config.min_feature_level)
    }

    pub fn select<B: GraphicsBackend>(&self, backend: &B) -> Result<AdapterCandidate<B::Adapter>> {
        if self.prefer_software {
            let candidate = backend.software_adapter()?;
            info!(adapter = %candidate.info.name, "Using software adapter");
            return Ok(candidate);
        }

        let mut best: Option<AdapterCandidate<B::Adapter>> = None;
        for candidate in backend.enumerate_adapters()? {
            if candidate.info.software {
                debug!(adapter = %candidate.info.name, "Skipping software adapter");
                continue;
            }
            if !backend.supports_feature_level(&candidate.adapter, self.min_feature_level) {
                debug!(
                    adapter = %candidate.info.name,
                    level = %self.min_feature_level,
                    "Skipping adapter below the minimum feature level"
                );
                continue;
            }

            // 严格大于且从 0 开始比较：显存相同取先枚举者，没有专用显存的适配器不会入选
            let best_memory = best.as_ref().map_or(0, |current| current.info.dedicated_video_memory);
            if candidate.info.dedicated_video_memory > best_memory {
                best = Some(candidate);
            } else if candidate.info.dedicated_video_memory == 0 {
                debug!(adapter = %candidate.info.name, "Skipping adapter without dedicated video memory");
            }
        }

        let chosen = best.ok_or_else(|| {
            GraphicsError::AdapterUnavailable(format!(
                "no hardware adapter with dedicated video memory supports feature level {}",
                self.min_feature_level
            ))
        })?;

        info!(
            adapter = %chosen.info.name,
            index = chosen.info.index,
            dedicated_video_memory_mb = chosen.info.dedicated_video_memory >> 20,
            "Adapter selected"
        );
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DxFrameError;
    use crate::gfx::headless::{HeadlessAdapter, HeadlessBackend, HeadlessOptions};

    fn backend(adapters: Vec<HeadlessAdapter>) -> HeadlessBackend {
        HeadlessBackend::new(HeadlessOptions {
            adapters,
            ..HeadlessOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_picks_largest_dedicated_memory() {
        let backend = backend(vec![
            HeadlessAdapter::hardware(0, "small", 256 << 20, FeatureLevel::Level12_0),
            HeadlessAdapter::hardware(1, "large", 4 << 30, FeatureLevel::Level12_0),
            HeadlessAdapter::hardware(2, "medium", 1 << 30, FeatureLevel::Level12_0),
        ]);
        let chosen = AdapterSelector::new(false, FeatureLevel::Level11_0).select(&backend).unwrap();
        assert_eq!(chosen.info.name, "large");
    }

    #[test]
    fn test_ties_keep_first_enumerated() {
        let backend = backend(vec![
            HeadlessAdapter::hardware(0, "first", 2 << 30, FeatureLevel::Level12_0),
            HeadlessAdapter::hardware(1, "second", 2 << 30, FeatureLevel::Level12_0),
        ]);
        let chosen = AdapterSelector::new(false, FeatureLevel::Level11_0).select(&backend).unwrap();
        assert_eq!(chosen.info.index, 0);
    }

    #[test]
    fn test_skips_software_and_unsupported_levels() {
        let backend = backend(vec![
            HeadlessAdapter::software(0, "warp"),
            HeadlessAdapter::hardware(1, "old", 8 << 30, FeatureLevel::Level11_0),
            HeadlessAdapter::hardware(2, "modern", 1 << 30, FeatureLevel::Level12_1),
        ]);
        let chosen = AdapterSelector::new(false, FeatureLevel::Level12_0).select(&backend).unwrap();
        assert_eq!(chosen.info.name, "modern");
    }

    #[test]
    fn test_zero_memory_adapter_never_selected() {
        let lone = backend(vec![HeadlessAdapter::hardware(0, "igpu", 0, FeatureLevel::Level12_0)]);
        let err = AdapterSelector::new(false, FeatureLevel::Level11_0).select(&lone).unwrap_err();
        assert!(matches!(err, DxFrameError::Graphics(GraphicsError::AdapterUnavailable(_))));

        let mixed = backend(vec![
            HeadlessAdapter::hardware(0, "igpu", 0, FeatureLevel::Level12_0),
            HeadlessAdapter::hardware(1, "dgpu", 1 << 30, FeatureLevel::Level12_0),
        ]);
        let chosen = AdapterSelector::new(false, FeatureLevel::Level11_0).select(&mixed).unwrap();
        assert_eq!(chosen.info.name, "dgpu");
    }

    #[test]
    fn test_no_qualifying_adapter() {
        let backend = backend(vec![HeadlessAdapter::software(0, "warp")]);
        let err = AdapterSelector::new(false, FeatureLevel::Level11_0).select(&backend).unwrap_err();
        assert!(matches!(err, DxFrameError::Graphics(GraphicsError::AdapterUnavailable(_))));
    }

    #[test]
    fn test_software_preference() {
        let backend = backend(HeadlessOptions::default().adapters);
        let chosen = AdapterSelector::new(true, FeatureLevel::Level11_0).select(&backend).unwrap();
        assert!(chosen.info.software);
    }
}
