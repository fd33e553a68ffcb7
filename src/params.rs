use crate::clip::Axis;

/// External parameter input, already decoded from whatever controller sent it.
///
/// Mode indices wrap; numeric values are clamped when the settings snapshot is
/// sanitized.
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterEvent {
    ParticleMode(i64),
    VoxelMode(i64),
    Level(i64),
    BaseResolution(u32),
    VoxelThrottle(f32),
    FlowThrottle(f32),
    Drag(f32),
    SpeedLimit(f32),
    Gravity([f32; 3]),
    NoiseAmplitude(f32),
    NoiseFrequency(f32),
    DelaySpeed(f32),
    TransformSpeed(f32),
    ClipSpeed(f32),

    ClipMin([f32; 3]),
    ClipMax([f32; 3]),
    ClipAxis { axis: Axis, min: f32, max: f32 },
    ClipBigOne,
    ClipGridCell { index: i64, width: u32, height: u32, depth: u32 },
    ClipRandomize,

    TriggerFlow,
    Randomize,
    Glitch,

    MidairInit,
    MidairRotate,
    MidairScale,
    MidairMotion(i64),
    MidairExtrusion(f32),
    MidairThickness(f32),
    MidairThrottle(f32),
    MidairDuration(f32),

    FloorTrigger(i64),
    FloorPlasticity(f32),
    FloorElevation(f32),
}
