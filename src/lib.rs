//! # Overview
//!
//! `midiread` decodes Standard Midi Files (SMF, `.mid` files) into a structured event model, and
//! reconstructs the notes they contain with absolute onset and offset times in seconds, following
//! every tempo change in the file.
//!
//! Decoding and reconstruction are two separate steps:
//!
//! ```rust
//! use midiread::MidiFile;
//!
//! # let bytes: &[u8] = &[
//! #     0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x01, 0xE0,
//! #     0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x0D,
//! #     0x00, 0x90, 0x3C, 0x40,
//! #     0x83, 0x60, 0x80, 0x3C, 0x00,
//! #     0x00, 0xFF, 0x2F, 0x00,
//! # ];
//! let file = MidiFile::parse(bytes).unwrap();
//! for (i, track) in file.tracks.iter().enumerate() {
//!     println!("track {} has {} events", i, track.len());
//! }
//!
//! let reconstruction = file.reconstruct();
//! for note in &reconstruction.notes {
//!     println!("pitch {} from {}s to {}s", note.pitch, note.start, note.end);
//! }
//! println!("tempo list (ms per beat): {:?}", reconstruction.tempo_list());
//! ```
//!
//! The [`MidiFile`](struct.MidiFile.html) struct is the main type in the crate.
//! See its documentation for the structure of decoded MIDI files.
//!
//! # About lifetimes
//!
//! Decoded events borrow their data bytes from the raw file, in order to avoid allocations.
//! For this reason, the byte buffer must be loaded separately from the `MidiFile` structure:
//!
//! ```rust,no_run
//! use std::fs;
//! use midiread::MidiFile;
//!
//! // Load bytes into a buffer
//! let bytes = fs::read("song.mid").unwrap();
//!
//! // Decode bytes in a separate step
//! let file = MidiFile::parse(&bytes).unwrap();
//! ```
//!
//! # Decoding
//!
//! Decoding is strict. Any violation of the file structure, such as a bad header, a track chunk
//! with a wrong tag or length, a truncated message, or running status used before any status
//! byte, fails the whole file with an [`Error`](struct.Error.html) carrying the
//! [`ErrorKind`](enum.ErrorKind.html), the byte offset and the track index.
//! Only ticks-per-quarter-note time division is supported; SMPTE division is rejected.
//!
//! For lazy, track-by-track decoding use the [`parse`](fn.parse.html) function.
//! To also get the raw bytes each event was decoded from, use
//! [`MidiFileBytemap`](struct.MidiFileBytemap.html).
//!
//! # Note reconstruction
//!
//! [`reconstruct_notes`](fn.reconstruct_notes.html) replays each track against the file's
//! [`TempoMap`](struct.TempoMap.html), opening a note on every note-on with nonzero velocity and
//! closing the earliest matching open note on every note-off (or note-on with zero velocity).
//! Notes still sounding at the end of a track are closed at the time of its last event.
//! Irregularities such as note-offs for notes that were never opened are not errors: they are
//! logged through `tracing` and collected as [`Diagnostic`](enum.Diagnostic.html)s.
//!
//! # About features
//!
//! - The `std` feature
//!
//!   Integrates with the standard library, notably implementing `std::error::Error` for
//!   [`Error`](struct.Error.html).
//!   Disabling this feature with `default-features = false` makes the crate `no_std + alloc`.
//!
//! - The `parallel` feature
//!
//!   Decodes tracks, and reconstructs their notes, on multiple threads through the `rayon`
//!   dependency. Multithreading is skipped for tiny files. Results are identical either way.
//!
//! Both features are enabled by default.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::vec::Vec;

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
mod error;

mod prelude {
    pub(crate) use crate::error::{Error, ErrorKind, Result, ResultExt};
    pub(crate) use alloc::{vec, vec::Vec};
}

mod event;
mod notes;
mod primitive;
mod smf;
mod tempo;

pub use crate::{
    error::{Error, ErrorKind, Result},
    event::{Event, EventKind, MetaMessage, ModeMessage, VoiceMessage},
    notes::{
        reconstruct_notes, reconstruct_with, Diagnostic, EndOfTrack, EndTimes, NoteRecord,
        ReconstructOptions, Reconstruction,
    },
    primitive::{ByteCursor, Format},
    smf::{parse, EventIter, Header, MidiFile, MidiFileBytemap, Track, TrackIter},
    tempo::{TempoChange, TempoMap},
};

/// Tracks smaller than this, in total, are processed on the calling thread.
#[cfg(feature = "parallel")]
const PARALLEL_ENABLE_THRESHOLD: usize = 16 * 1024;

/// Apply `op` to every track-sized work item, in order.
///
/// `weight` is a rough measure of the total work (bytes or events), used to skip threading for
/// tiny files.
pub(crate) fn map_tracks<T, R, F>(items: Vec<T>, weight: usize, op: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        if items.len() > 1 && weight >= PARALLEL_ENABLE_THRESHOLD {
            use rayon::prelude::*;
            return items.into_par_iter().map(op).collect();
        }
    }
    let _ = weight;
    items.into_iter().map(op).collect()
}
