//! Keyframe animation clips and the mixer that applies them to a subtree.

use std::collections::HashMap;

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};
use log::{debug, warn};

use crate::data_structures::scene_graph::{NodeId, SceneGraph};

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

/// Keyframes driving one property of one node.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Index of the animated node in the file the clip came from.
    pub target: usize,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
    pub interpolation: Interpolation,
}

/// Position of `time` between two keyframes: `(lower, upper, factor)`.
fn locate(timestamps: &[f32], time: f32) -> Option<(usize, usize, f32)> {
    let last = timestamps.len().checked_sub(1)?;
    if time <= timestamps[0] {
        return Some((0, 0, 0.0));
    }
    if time >= timestamps[last] {
        return Some((last, last, 0.0));
    }
    let upper = timestamps.partition_point(|stamp| *stamp <= time);
    let lower = upper - 1;
    let span = timestamps[upper] - timestamps[lower];
    let factor = if span > 0.0 {
        (time - timestamps[lower]) / span
    } else {
        0.0
    };
    Some((lower, upper, factor))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sample {
    Translation(Vector3<f32>),
    Rotation(Quaternion<f32>),
    Scale(Vector3<f32>),
}

impl Channel {
    pub fn sample(&self, time: f32) -> Option<Sample> {
        let (lower, upper, factor) = locate(&self.timestamps, time)?;
        let factor = match self.interpolation {
            Interpolation::Linear => factor,
            Interpolation::Step => 0.0,
        };
        match &self.keyframes {
            Keyframes::Translation(values) => {
                let (a, b) = (values.get(lower)?, values.get(upper)?);
                Some(Sample::Translation(a.lerp(*b, factor)))
            }
            Keyframes::Rotation(values) => {
                let (a, b) = (values.get(lower)?, values.get(upper)?);
                Some(Sample::Rotation(a.slerp(*b, factor).normalize()))
            }
            Keyframes::Scale(values) => {
                let (a, b) = (values.get(lower)?, values.get(upper)?);
                Some(Sample::Scale(a.lerp(*b, factor)))
            }
            Keyframes::Other => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    /// Largest timestamp over all channels, in seconds.
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: &str, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|channel| channel.timestamps.last().copied())
            .fold(0.0, f32::max);
        Self {
            name: name.to_string(),
            channels,
            duration,
        }
    }

    /// Exact, case sensitive lookup by clip name.
    pub fn find_by_name<'a>(clips: &'a [AnimationClip], name: &str) -> Option<&'a AnimationClip> {
        clips.iter().find(|clip| clip.name == name)
    }
}

/// Playback state of one clip. Actions start stopped.
#[derive(Clone, Debug)]
pub struct ClipAction {
    clip: AnimationClip,
    time: f32,
    running: bool,
    pub looping: bool,
}

impl ClipAction {
    fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            running: false,
            looping: true,
        }
    }

    pub fn play(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    fn advance(&mut self, dt: f32) {
        self.time += dt;
        let duration = self.clip.duration;
        if self.time > duration {
            if self.looping && duration > 0.0 {
                self.time %= duration;
            } else {
                self.time = duration;
                self.running = false;
            }
        }
    }
}

/// Drives the clip actions of one loaded subtree.
#[derive(Debug)]
pub struct AnimationMixer {
    root: NodeId,
    bindings: HashMap<usize, NodeId>,
    actions: Vec<ClipAction>,
    time: f32,
}

impl AnimationMixer {
    /// `bindings` maps channel targets (node indices of the source file) to
    /// the scene nodes created for them.
    pub fn new(root: NodeId, bindings: HashMap<usize, NodeId>) -> Self {
        Self {
            root,
            bindings,
            actions: Vec::new(),
            time: 0.0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total time the mixer has been advanced by.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// The action for `clip`, created on first request.
    pub fn clip_action(&mut self, clip: &AnimationClip) -> &mut ClipAction {
        let idx = match self
            .actions
            .iter()
            .position(|action| action.clip.name == clip.name)
        {
            Some(idx) => idx,
            None => {
                debug!("Preparing action for clip {:?}", clip.name);
                self.actions.push(ClipAction::new(clip.clone()));
                self.actions.len() - 1
            }
        };
        &mut self.actions[idx]
    }

    pub fn actions(&self) -> &[ClipAction] {
        &self.actions
    }

    /// Advance every running action by `dt` seconds and write the sampled
    /// pose into the bound nodes.
    pub fn update(&mut self, dt: f32, scene: &mut SceneGraph) {
        self.time += dt;
        for action in self.actions.iter_mut().filter(|action| action.running) {
            action.advance(dt);
            for channel in &action.clip.channels {
                let Some(node_id) = self.bindings.get(&channel.target) else {
                    continue;
                };
                let Some(node) = scene.node_mut(*node_id) else {
                    warn!("Animated node {:?} is no longer in the scene.", node_id);
                    continue;
                };
                match channel.sample(action.time) {
                    Some(Sample::Translation(position)) => node.transform.position = position,
                    Some(Sample::Rotation(rotation)) => {
                        node.transform.set_rotation_quaternion(rotation)
                    }
                    Some(Sample::Scale(scale)) => node.transform.scale = scale,
                    None => (),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::{NodeKind, NodeTemplate};

    fn slide() -> AnimationClip {
        AnimationClip::new(
            "myAnimation",
            vec![Channel {
                target: 3,
                timestamps: vec![0.0, 1.0, 2.0],
                keyframes: Keyframes::Translation(vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(2.0, 0.0, 0.0),
                    Vector3::new(2.0, 4.0, 0.0),
                ]),
                interpolation: Interpolation::Linear,
            }],
        )
    }

    #[test]
    fn linear_sampling_interpolates() {
        let clip = slide();
        assert_eq!(clip.duration, 2.0);
        let channel = &clip.channels[0];
        assert_eq!(
            channel.sample(0.5),
            Some(Sample::Translation(Vector3::new(1.0, 0.0, 0.0)))
        );
        assert_eq!(
            channel.sample(1.5),
            Some(Sample::Translation(Vector3::new(2.0, 2.0, 0.0)))
        );
        // clamped outside the keyframe range
        assert_eq!(
            channel.sample(7.0),
            Some(Sample::Translation(Vector3::new(2.0, 4.0, 0.0)))
        );
    }

    #[test]
    fn step_sampling_holds_previous_key() {
        let mut clip = slide();
        clip.channels[0].interpolation = Interpolation::Step;
        assert_eq!(
            clip.channels[0].sample(0.9),
            Some(Sample::Translation(Vector3::new(0.0, 0.0, 0.0)))
        );
    }

    #[test]
    fn prepared_action_does_not_move_nodes() {
        let mut scene = SceneGraph::new();
        let node = scene.add(NodeTemplate::new(NodeKind::Group));
        let mut mixer = AnimationMixer::new(node, HashMap::from([(3, node)]));
        let clips = vec![slide()];
        let clip = AnimationClip::find_by_name(&clips, "myAnimation").unwrap();
        mixer.clip_action(clip);
        mixer.update(0.5, &mut scene);
        assert_eq!(mixer.actions().len(), 1);
        assert!(!mixer.actions()[0].is_running());
        assert_eq!(
            scene.node(node).unwrap().transform.position,
            Vector3::new(0.0, 0.0, 0.0)
        );

        mixer.clip_action(clip).play();
        mixer.update(0.5, &mut scene);
        assert_eq!(mixer.actions().len(), 1);
        assert_eq!(
            scene.node(node).unwrap().transform.position,
            Vector3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(mixer.time(), 1.0);
    }

    #[test]
    fn lookup_is_exact() {
        let clips = vec![slide()];
        assert!(AnimationClip::find_by_name(&clips, "myanimation").is_none());
        assert!(AnimationClip::find_by_name(&clips, "myAnimation").is_some());
    }
}
