//! Keyboard bindings for the windowed host.
//!
//! | Keys | Event |
//! |------|-------|
//! | `1`-`4` | particle mode |
//! | `q` `w` `e` `r` | voxel mode |
//! | `[` `]` | level of detail down / up |
//! | `f` | flow burst |
//! | `g` `z` | glitch / randomize voxels |
//! | `b` `c` `x` | clip: big one / random / next grid cell |
//! | `i` `o` `p` | midair init / rotate / scale |
//! | `m` | next midair motion |
//! | `n` `j` `k` | floor noise / circle / line |

use crate::grid::midair::MidairMotion;
use crate::params::ParameterEvent;
use crate::scene::Scene;

const CLIP_CELLS: u32 = 3;

/// Tracks the state keys step through.
#[derive(Default)]
pub struct KeyBindings {
    clip_cell: i64,
}

impl KeyBindings {
    pub fn event(&mut self, key: &str, scene: &Scene) -> Option<ParameterEvent> {
        let event = match key {
            "1" | "2" | "3" | "4" => {
                let index = key.parse::<i64>().ok()? - 1;
                ParameterEvent::ParticleMode(index)
            }
            "q" => ParameterEvent::VoxelMode(0),
            "w" => ParameterEvent::VoxelMode(1),
            "e" => ParameterEvent::VoxelMode(2),
            "r" => ParameterEvent::VoxelMode(3),
            "[" => ParameterEvent::Level(scene.settings().voxel.level as i64 - 1),
            "]" => ParameterEvent::Level(scene.settings().voxel.level as i64 + 1),
            "f" => ParameterEvent::TriggerFlow,
            "g" => ParameterEvent::Glitch,
            "z" => ParameterEvent::Randomize,
            "b" => ParameterEvent::ClipBigOne,
            "c" => ParameterEvent::ClipRandomize,
            "x" => {
                let index = self.clip_cell;
                self.clip_cell = (self.clip_cell + 1) % (CLIP_CELLS * CLIP_CELLS * CLIP_CELLS) as i64;
                ParameterEvent::ClipGridCell {
                    index,
                    width: CLIP_CELLS,
                    height: CLIP_CELLS,
                    depth: CLIP_CELLS,
                }
            }
            "i" => ParameterEvent::MidairInit,
            "o" => ParameterEvent::MidairRotate,
            "p" => ParameterEvent::MidairScale,
            "m" => {
                let current = scene.midair().motion();
                let index = MidairMotion::ALL.iter().position(|m| *m == current).unwrap_or(0);
                ParameterEvent::MidairMotion(index as i64 + 1)
            }
            "n" => ParameterEvent::FloorTrigger(0),
            "j" => ParameterEvent::FloorTrigger(1),
            "k" => ParameterEvent::FloorTrigger(2),
            _ => return None,
        };
        Some(event)
    }
}
