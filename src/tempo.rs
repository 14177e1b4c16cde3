//! Tempo maps: where in the file the length of a beat changes.

use crate::{event::MetaMessage, prelude::*, Event};
use tracing::debug;

/// A single tempo change.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct TempoChange {
    /// Cumulative ticks from the start of the track the change was found in.
    pub tick: u64,
    /// Microseconds per beat (quarter note) from this point onwards.
    pub micros_per_beat: u32,
}
impl TempoChange {
    /// Milliseconds per beat.
    #[inline]
    pub fn millis_per_beat(&self) -> f64 {
        f64::from(self.micros_per_beat) / 1000.0
    }

    /// Beats per minute.
    #[inline]
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / f64::from(self.micros_per_beat)
    }
}

/// All tempo changes in a file, ordered by tick position.
///
/// Built once per file from the tempo meta events of all tracks combined. Never empty: a file
/// without tempo events gets a single change to the default tempo of 120 BPM at tick 0.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}
impl TempoMap {
    /// 500000 microseconds per beat, or 120 BPM.
    pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

    /// Collect the Set Tempo events of the given tracks.
    ///
    /// Each track accumulates its own tick counter from its delta times. Changes are pooled and
    /// sorted by tick; changes at the same tick keep their encounter order (track order, then
    /// event order).
    pub fn build<'t, 'a: 't, I>(tracks: I) -> TempoMap
    where
        I: IntoIterator<Item = &'t [Event<'a>]>,
    {
        let mut changes = Vec::new();
        for (track_idx, track) in tracks.into_iter().enumerate() {
            let mut tick: u64 = 0;
            for ev in track {
                tick += u64::from(ev.delta);
                match ev.meta() {
                    Some(MetaMessage::Tempo(micros_per_beat)) => changes.push(TempoChange {
                        tick,
                        micros_per_beat,
                    }),
                    Some(MetaMessage::Unknown(0x51, data)) => debug!(
                        track = track_idx,
                        tick,
                        len = data.len(),
                        "ignoring set tempo event with a short payload"
                    ),
                    _ => {}
                }
            }
        }
        if changes.is_empty() {
            changes.push(TempoChange {
                tick: 0,
                micros_per_beat: Self::DEFAULT_MICROS_PER_BEAT,
            });
        }
        //Stable sort, ties remain in encounter order
        changes.sort_by_key(|change| change.tick);
        TempoMap { changes }
    }

    /// Create a tempo map from a list of changes, which will be sorted by tick.
    ///
    /// Returns `None` if the list is empty.
    pub fn from_changes(mut changes: Vec<TempoChange>) -> Option<TempoMap> {
        if changes.is_empty() {
            return None;
        }
        changes.sort_by_key(|change| change.tick);
        Some(TempoMap { changes })
    }

    /// The tempo changes, in ascending tick order.
    #[inline]
    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// The tempo in effect at the given tick: the value of the change with the greatest tick
    /// position that is not after `tick`.
    ///
    /// If several changes share that position the last one wins. Returns `None` if every change
    /// lies after `tick`.
    pub fn tempo_at(&self, tick: u64) -> Option<u32> {
        let idx = self.changes.partition_point(|change| change.tick <= tick);
        idx.checked_sub(1)
            .map(|idx| self.changes[idx].micros_per_beat)
    }

    /// The tempo to start every track with: the tempo at tick 0, or the default tempo if the
    /// first change happens later.
    #[inline]
    pub fn initial(&self) -> u32 {
        self.tempo_at(0).unwrap_or(Self::DEFAULT_MICROS_PER_BEAT)
    }

    /// Every tempo change as milliseconds per beat, in map order.
    pub fn millis_per_beat(&self) -> Vec<f64> {
        self.changes
            .iter()
            .map(TempoChange::millis_per_beat)
            .collect()
    }
}
impl Default for TempoMap {
    fn default() -> TempoMap {
        TempoMap {
            changes: vec![TempoChange {
                tick: 0,
                micros_per_beat: Self::DEFAULT_MICROS_PER_BEAT,
            }],
        }
    }
}
