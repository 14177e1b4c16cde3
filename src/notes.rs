//! Note reconstruction: replays decoded tracks against the tempo map to pair note-on and
//! note-off events into notes with absolute onset and offset times, in seconds.

use crate::{
    event::{Event, EventKind, VoiceMessage},
    prelude::*,
    smf::MidiFile,
    tempo::TempoMap,
};
use tracing::{debug, warn};

/// A note with absolute start and end times.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct NoteRecord {
    /// Index of the track the note was found in.
    pub track: usize,
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    /// Onset, in seconds from the start of the track.
    pub start: f64,
    /// Offset, in seconds from the start of the track.
    pub end: f64,
    /// Index, within its track, of the note-on event that opened the note.
    pub start_index: usize,
    /// Index, within its track, of the event that closed the note.
    ///
    /// `None` if the track ended while the note was still sounding, in which case `end` is the
    /// time of the last event in the track.
    pub end_index: Option<usize>,
}
impl NoteRecord {
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the note was closed by a note-off, rather than by the end of its track.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.end_index.is_some()
    }
}

/// An End of Track meta event, located in time.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct EndOfTrack {
    pub track: usize,
    pub event_index: usize,
    pub seconds: f64,
}

/// The End of Track events found in a file, in encounter order.
///
/// Well-formed files have exactly one per track, but nothing stops a track from having several
/// or none at all.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct EndTimes(Vec<EndOfTrack>);
impl EndTimes {
    /// The end time of the file, if there is exactly one End of Track event in the whole file.
    pub fn single(&self) -> Option<f64> {
        match self.0[..] {
            [only] => Some(only.seconds),
            _ => None,
        }
    }

    /// All end times in encounter order.
    pub fn seconds(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().map(|eot| eot.seconds)
    }

    /// The End of Track events found in the given track.
    pub fn for_track(&self, track: usize) -> impl Iterator<Item = &EndOfTrack> + '_ {
        self.0.iter().filter(move |eot| eot.track == track)
    }

    #[inline]
    pub fn as_slice(&self) -> &[EndOfTrack] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A non-fatal irregularity found while reconstructing notes.
///
/// These never alter control flow. They are logged as warnings and also collected in
/// [`Reconstruction::diagnostics`](struct.Reconstruction.html#structfield.diagnostics).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Diagnostic {
    /// A note-off (or a note-on with zero velocity) with no matching open note.
    UnopenedNoteOff {
        track: usize,
        channel: u8,
        pitch: u8,
        event_index: usize,
    },
    /// A track had more than one End of Track event. All of them are recorded.
    DuplicateEndOfTrack { track: usize, event_index: usize },
}

/// The result of reconstructing the notes of a file.
#[derive(Clone, PartialEq, Debug)]
pub struct Reconstruction {
    /// Notes of all reconstructed tracks, sorted by start time.
    ///
    /// Notes starting at the same time keep their encounter order: track order, then creation
    /// order within the track.
    pub notes: Vec<NoteRecord>,
    pub end_times: EndTimes,
    pub tempo_map: TempoMap,
    pub diagnostics: Vec<Diagnostic>,
}
impl Reconstruction {
    /// The tempo map as milliseconds per beat.
    pub fn tempo_list(&self) -> Vec<f64> {
        self.tempo_map.millis_per_beat()
    }
}

/// Options for [`reconstruct_with`](fn.reconstruct_with.html).
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ReconstructOptions {
    /// Reconstruct only these tracks, in this order. `None` reconstructs every track.
    ///
    /// The tempo map is always built from every track in the file.
    pub tracks: Option<Vec<usize>>,
}
impl ReconstructOptions {
    #[inline]
    pub fn new() -> ReconstructOptions {
        Self::default()
    }

    /// Restrict reconstruction to the given tracks.
    pub fn tracks<I: IntoIterator<Item = usize>>(mut self, tracks: I) -> ReconstructOptions {
        self.tracks = Some(tracks.into_iter().collect());
        self
    }
}

/// Reconstruct the notes of every track in the file.
pub fn reconstruct_notes(file: &MidiFile) -> Reconstruction {
    let all = (0..file.tracks.len()).collect();
    reconstruct_tracks(file, all)
}

/// Reconstruct notes according to `options`.
///
/// Fails only if a requested track does not exist.
pub fn reconstruct_with(file: &MidiFile, options: &ReconstructOptions) -> Result<Reconstruction> {
    let tracks = match &options.tracks {
        Some(tracks) => {
            if let Some(&bad) = tracks.iter().find(|&&idx| idx >= file.tracks.len()) {
                //Not a decoding error, so there is no byte position to point at
                bail!(Error::new(ErrorKind::TrackOutOfRange(bad), 0).with_track(bad));
            }
            tracks.clone()
        }
        None => (0..file.tracks.len()).collect(),
    };
    Ok(reconstruct_tracks(file, tracks))
}

fn reconstruct_tracks(file: &MidiFile, track_list: Vec<usize>) -> Reconstruction {
    //The tempo map must be complete before any track is replayed
    let tempo_map = file.tempo_map();
    let ticks_per_beat = file.header.ticks_per_beat();
    let weight = track_list.iter().map(|&idx| file.tracks[idx].len()).sum();
    let replays = crate::map_tracks(track_list, weight, |idx| {
        TrackReplay::new(idx, &tempo_map, ticks_per_beat).run(&file.tracks[idx])
    });

    let mut notes = Vec::new();
    let mut end_times = Vec::new();
    let mut diagnostics = Vec::new();
    for replay in replays {
        notes.extend(replay.notes);
        end_times.extend(replay.end_times);
        diagnostics.extend(replay.diagnostics);
    }
    //Stable sort, ties remain in encounter order
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));
    debug!(
        notes = notes.len(),
        end_times = end_times.len(),
        tempo_changes = tempo_map.changes().len(),
        diagnostics = diagnostics.len(),
        "reconstructed notes"
    );
    Reconstruction {
        notes,
        end_times: EndTimes(end_times),
        tempo_map,
        diagnostics,
    }
}

/// What an event means for note pairing.
enum NoteAction {
    On { channel: u8, pitch: u8, velocity: u8 },
    Off { channel: u8, pitch: u8 },
    EndOfTrack,
    Nothing,
}
impl NoteAction {
    fn of(ev: &Event) -> NoteAction {
        match ev.kind {
            EventKind::ChannelVoice {
                channel,
                message: VoiceMessage::NoteOn,
                data,
            } => match *data {
                [pitch, velocity, ..] if velocity > 0 => NoteAction::On {
                    channel,
                    pitch,
                    velocity,
                },
                [pitch, ..] => NoteAction::Off { channel, pitch },
                [] => NoteAction::Nothing,
            },
            EventKind::ChannelVoice {
                channel,
                message: VoiceMessage::NoteOff,
                data,
            } => match *data {
                [pitch, ..] => NoteAction::Off { channel, pitch },
                [] => NoteAction::Nothing,
            },
            EventKind::ChannelVoice { .. } | EventKind::ChannelMode { .. } => NoteAction::Nothing,
            EventKind::Meta {
                meta_type: 0x2F, ..
            } => NoteAction::EndOfTrack,
            EventKind::Meta { .. } | EventKind::SysEx { .. } | EventKind::SysRealtime { .. } => {
                NoteAction::Nothing
            }
        }
    }
}

/// The notes, end times and diagnostics of a single track.
struct TrackNotes {
    notes: Vec<NoteRecord>,
    end_times: Vec<EndOfTrack>,
    diagnostics: Vec<Diagnostic>,
}

/// Replay state for a single track. Nothing here is shared between tracks.
struct TrackReplay<'m> {
    track: usize,
    tempo_map: &'m TempoMap,
    /// `ticks_per_beat * 1e6`, the divisor that turns tempo-ticks into seconds.
    seconds_divisor: f64,
    tick: u64,
    /// Sum of `delta * tempo` over all events so far, exact.
    tempo_ticks: u128,
    tempo: u32,
    /// Every note opened so far, in creation order. Open notes have no `end_index` yet and
    /// are listed in `open`.
    notes: Vec<NoteRecord>,
    /// Indices into `notes` of the notes still sounding, in creation order.
    open: Vec<usize>,
    end_times: Vec<EndOfTrack>,
    diagnostics: Vec<Diagnostic>,
}
impl<'m> TrackReplay<'m> {
    fn new(track: usize, tempo_map: &'m TempoMap, ticks_per_beat: u16) -> TrackReplay<'m> {
        TrackReplay {
            track,
            tempo_map,
            seconds_divisor: f64::from(ticks_per_beat) * 1_000_000.0,
            tick: 0,
            tempo_ticks: 0,
            tempo: tempo_map.initial(),
            notes: Vec::new(),
            open: Vec::new(),
            end_times: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Seconds elapsed since the start of the track.
    #[inline]
    fn seconds(&self) -> f64 {
        self.tempo_ticks as f64 / self.seconds_divisor
    }

    /// Advance time by `delta` ticks.
    ///
    /// The delta is converted with the tempo that was in effect *before* it, and only then is
    /// the tempo updated to the one in effect at the new position.
    fn advance(&mut self, delta: u32) {
        self.tick += u64::from(delta);
        self.tempo_ticks += u128::from(delta) * u128::from(self.tempo);
        if let Some(tempo) = self.tempo_map.tempo_at(self.tick) {
            self.tempo = tempo;
        }
    }

    fn run(mut self, events: &[Event]) -> TrackNotes {
        for (idx, ev) in events.iter().enumerate() {
            self.advance(ev.delta);
            match NoteAction::of(ev) {
                NoteAction::On {
                    channel,
                    pitch,
                    velocity,
                } => self.open_note(idx, channel, pitch, velocity),
                NoteAction::Off { channel, pitch } => self.close_note(idx, channel, pitch),
                NoteAction::EndOfTrack => self.end_of_track(idx),
                NoteAction::Nothing => {}
            }
        }
        //Notes still sounding are cut at the last event of the track
        let end = self.seconds();
        for idx in self.open.drain(..) {
            self.notes[idx].end = end;
        }
        TrackNotes {
            notes: self.notes,
            end_times: self.end_times,
            diagnostics: self.diagnostics,
        }
    }

    fn open_note(&mut self, idx: usize, channel: u8, pitch: u8, velocity: u8) {
        let start = self.seconds();
        self.open.push(self.notes.len());
        self.notes.push(NoteRecord {
            track: self.track,
            channel,
            pitch,
            velocity,
            start,
            end: start,
            start_index: idx,
            end_index: None,
        });
    }

    /// Close the earliest-opened note matching `channel` and `pitch`.
    fn close_note(&mut self, idx: usize, channel: u8, pitch: u8) {
        let notes = &self.notes;
        let found = self.open.iter().position(|&note_idx| {
            let note = &notes[note_idx];
            note.channel == channel && note.pitch == pitch
        });
        match found {
            Some(open_idx) => {
                let note_idx = self.open.remove(open_idx);
                let end = self.seconds();
                let note = &mut self.notes[note_idx];
                note.end = end;
                note.end_index = Some(idx);
            }
            None => {
                warn!(
                    track = self.track,
                    channel,
                    pitch,
                    event_index = idx,
                    "closing a note that was never opened"
                );
                self.diagnostics.push(Diagnostic::UnopenedNoteOff {
                    track: self.track,
                    channel,
                    pitch,
                    event_index: idx,
                });
            }
        }
    }

    fn end_of_track(&mut self, idx: usize) {
        if !self.end_times.is_empty() {
            warn!(
                track = self.track,
                event_index = idx,
                "duplicate end of track event"
            );
            self.diagnostics.push(Diagnostic::DuplicateEndOfTrack {
                track: self.track,
                event_index: idx,
            });
        }
        self.end_times.push(EndOfTrack {
            track: self.track,
            event_index: idx,
            seconds: self.seconds(),
        });
    }
}
