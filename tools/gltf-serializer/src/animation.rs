//! Animation tracks and their glTF channel/sampler form

use std::sync::Arc;

use gltf_json as json;
use gltf_json::animation::{Interpolation as GltfInterpolation, Property};
use gltf_json::validation::Checked::Valid;

use crate::buffer::{AccessorData, BufferLayout};
use crate::error::Result;
use crate::scene::SceneNode;

/// Name of the animation produced by [`merge_animations`]
pub const MERGED_ANIMATION_NAME: &str = "default";

/// Animated node property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackProperty {
    Translation,
    Rotation,
    Scale,
    /// Morph target weights
    Weights,
}

impl TrackProperty {
    /// Components per key in the output accessor
    pub fn component_count(self) -> usize {
        match self {
            Self::Translation | Self::Scale => 3,
            Self::Rotation => 4,
            Self::Weights => 1,
        }
    }

    pub fn to_gltf(self) -> Property {
        match self {
            Self::Translation => Property::Translation,
            Self::Rotation => Property::Rotation,
            Self::Scale => Property::Scale,
            Self::Weights => Property::MorphTargetWeights,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
    CubicSpline,
}

impl Interpolation {
    pub fn to_gltf(self) -> GltfInterpolation {
        match self {
            Self::Linear => GltfInterpolation::Linear,
            Self::Step => GltfInterpolation::Step,
            Self::CubicSpline => GltfInterpolation::CubicSpline,
        }
    }
}

/// Keyframes of one property of one node
#[derive(Debug, Clone)]
pub struct AnimationTrack {
    pub target: Arc<SceneNode>,
    pub property: TrackProperty,
    /// Key times in seconds
    pub times: Vec<f32>,
    /// Flattened key values
    pub values: Vec<f32>,
    pub interpolation: Interpolation,
}

impl AnimationTrack {
    pub fn new(target: Arc<SceneNode>, property: TrackProperty) -> Self {
        Self {
            target,
            property,
            times: Vec::new(),
            values: Vec::new(),
            interpolation: Interpolation::Linear,
        }
    }

    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Append one key; `value` is flattened in order
    pub fn key(mut self, time: f32, value: &[f32]) -> Self {
        self.times.push(time);
        self.values.extend_from_slice(value);
        self
    }
}

/// Named list of tracks
#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub name: Option<String>,
    pub tracks: Vec<AnimationTrack>,
}

impl Animation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn track(mut self, track: AnimationTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn build(self) -> Arc<Animation> {
        Arc::new(self)
    }
}

/// Convert one animation into a glTF animation.
///
/// Every track gets a sampler. A channel is only written when `node_index`
/// resolves the track's target, so tracks on unexported nodes keep their
/// sampler but drive nothing.
pub fn serialize_animation(
    animation: &Animation,
    layout: &mut BufferLayout,
    node_index: impl Fn(&Arc<SceneNode>) -> Option<u32>,
) -> Result<json::Animation> {
    let mut samplers = Vec::with_capacity(animation.tracks.len());
    let mut channels = Vec::new();

    for track in &animation.tracks {
        let input = layout.accessor_for(&AccessorData::from_f32(&track.times, 1))?;
        let output = layout.accessor_for(&AccessorData::from_f32(
            &track.values,
            track.property.component_count(),
        ))?;

        let sampler = json::Index::new(samplers.len() as u32);
        samplers.push(json::animation::Sampler {
            extensions: None,
            extras: Default::default(),
            input: input.as_json_index(),
            interpolation: Valid(track.interpolation.to_gltf()),
            output: output.as_json_index(),
        });

        match node_index(&track.target) {
            Some(node) => channels.push(json::animation::Channel {
                sampler,
                target: json::animation::Target {
                    extensions: None,
                    extras: Default::default(),
                    node: json::Index::new(node),
                    path: Valid(track.property.to_gltf()),
                },
                extensions: None,
                extras: Default::default(),
            }),
            None => tracing::debug!(
                "dropping channel for unexported node {:?}",
                track.target.name
            ),
        }
    }

    Ok(json::Animation {
        extensions: None,
        extras: Default::default(),
        channels,
        name: animation.name.clone(),
        samplers,
    })
}

/// Flatten `animations` into a single animation.
///
/// Sampler indices of each source are shifted by the samplers placed before
/// it. An empty input stays empty.
pub fn merge_animations(animations: Vec<json::Animation>) -> Vec<json::Animation> {
    if animations.is_empty() {
        return animations;
    }

    let mut merged = json::Animation {
        extensions: None,
        extras: Default::default(),
        channels: Vec::new(),
        name: Some(MERGED_ANIMATION_NAME.to_string()),
        samplers: Vec::new(),
    };

    for animation in animations {
        let offset = merged.samplers.len() as u32;
        merged
            .channels
            .extend(animation.channels.into_iter().map(|mut channel| {
                channel.sampler = json::Index::new(channel.sampler.value() as u32 + offset);
                channel
            }));
        merged.samplers.extend(animation.samplers);
    }

    vec![merged]
}
