//! Specific to the SMF packaging of MIDI streams.

use crate::{
    event::Event,
    notes::{self, Reconstruction, ReconstructOptions},
    prelude::*,
    primitive::{ByteCursor, Format},
    tempo::TempoMap,
};
use tracing::{debug, trace};

/// A track is simply the ordered list of its events.
pub type Track<'a> = Vec<Event<'a>>;

/// A decoded Standard Midi File.
///
/// Events borrow their data bytes from the raw file buffer, so the buffer must outlive this
/// structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiFile<'a> {
    pub header: Header,
    pub tracks: Vec<Track<'a>>,
}
impl<'a> MidiFile<'a> {
    pub fn new(header: Header, tracks: Vec<Track<'a>>) -> MidiFile<'a> {
        MidiFile { header, tracks }
    }

    /// Decode a whole file.
    ///
    /// Either every track decodes successfully or an error is returned; there are no partial
    /// results. If several tracks fail, the error of the lowest-indexed one is reported.
    pub fn parse(raw: &'a [u8]) -> Result<MidiFile<'a>> {
        let (header, tracks) = parse(raw)?;
        let tracks = tracks.collect_events()?;
        Ok(MidiFile { header, tracks })
    }

    /// Build the tempo map of this file, pooling tempo changes from all tracks.
    pub fn tempo_map(&self) -> TempoMap {
        TempoMap::build(self.tracks.iter().map(|track| &track[..]))
    }

    /// Reconstruct absolute-time notes from all tracks.
    pub fn reconstruct(&self) -> Reconstruction {
        notes::reconstruct_notes(self)
    }

    /// Reconstruct absolute-time notes with the given options.
    pub fn reconstruct_with(&self, options: &ReconstructOptions) -> Result<Reconstruction> {
        notes::reconstruct_with(self, options)
    }
}

/// Like [`MidiFile`](struct.MidiFile.html), but each event is paired with the exact raw bytes
/// it was decoded from, delta time included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiFileBytemap<'a> {
    pub header: Header,
    pub tracks: Vec<Vec<(&'a [u8], Event<'a>)>>,
}
impl<'a> MidiFileBytemap<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<MidiFileBytemap<'a>> {
        let (header, tracks) = parse(raw)?;
        let tracks = tracks.collect_bytemapped()?;
        Ok(MidiFileBytemap { header, tracks })
    }

    /// Drop the raw byte slices, keeping only the events.
    pub fn into_midi_file(self) -> MidiFile<'a> {
        MidiFile {
            header: self.header,
            tracks: self
                .tracks
                .into_iter()
                .map(|track| track.into_iter().map(|(_raw, ev)| ev).collect())
                .collect(),
        }
    }
}

/// Parse the header of a file and prepare to frame its tracks lazily.
///
/// This is the lowest-level entry point: tracks are only framed and decoded as the returned
/// iterator is advanced.
pub fn parse(raw: &[u8]) -> Result<(Header, TrackIter)> {
    let mut cursor = ByteCursor::new(raw);
    let (header, track_count) = Header::read(&mut cursor)?;
    debug!(
        format = header.format.code(),
        track_count,
        ticks_per_beat = header.ticks_per_beat,
        "parsed midi header"
    );
    Ok((header, TrackIter::new(cursor, track_count)))
}

/// A MIDI file header.
///
/// Ticks per quarter note are always in the range `1 ..= 0x7FFF`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Header {
    format: Format,
    ticks_per_beat: u16,
}
impl Header {
    const LEN: u32 = 6;

    /// Create a header, or `None` if `ticks_per_beat` is zero or has the SMPTE bit set.
    pub fn new(format: Format, ticks_per_beat: u16) -> Option<Header> {
        if ticks_per_beat == 0 || ticks_per_beat & 0x8000 != 0 {
            return None;
        }
        Some(Header {
            format,
            ticks_per_beat,
        })
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Ticks per quarter note.
    #[inline]
    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    /// Read both the header and the track count, leaving the cursor right after the header
    /// chunk.
    fn read(raw: &mut ByteCursor) -> Result<(Header, u16)> {
        ensure!(
            raw.unread().starts_with(b"MThd"),
            raw.error(ErrorKind::BadMagic)
        );
        raw.read_slice(4)?;
        let at = *raw;
        let len = raw.read_u32()?;
        ensure!(len == Self::LEN, at.error(ErrorKind::BadHeaderLength(len)));
        let format = Format::read(raw)?;
        let at = *raw;
        let track_count = raw.read_u16()?;
        ensure!(
            format != Format::SingleTrack || track_count == 1,
            at.error(ErrorKind::FormatTrackMismatch(track_count))
        );
        let at = *raw;
        let division = raw.read_u16()?;
        ensure!(
            division & 0x8000 == 0,
            at.error(ErrorKind::UnsupportedTimeFormat)
        );
        ensure!(division != 0, at.error(ErrorKind::ZeroTicksPerBeat));
        let header = Header {
            format,
            ticks_per_beat: division,
        };
        Ok((header, track_count))
    }
}

/// An iterator over the tracks in a Standard Midi File.
///
/// Yields exactly as many tracks as the header declares. Each track chunk must start with the
/// `MTrk` tag, and its declared length bounds the events decoded from it. Bytes after the last
/// declared track are ignored.
#[derive(Clone, Debug)]
pub struct TrackIter<'a> {
    raw: ByteCursor<'a>,
    track_idx: usize,
    track_count: u16,
}
impl<'a> TrackIter<'a> {
    fn new(raw: ByteCursor<'a>, track_count: u16) -> TrackIter<'a> {
        TrackIter {
            raw,
            track_idx: 0,
            track_count,
        }
    }

    /// The bytes after the last framed track.
    pub fn unread(&self) -> &'a [u8] {
        self.raw.unread()
    }

    /// Locate the next track chunk and slice out its event region.
    fn frame(&mut self) -> Result<EventIter<'a>> {
        let track = self.track_idx;
        ensure!(
            self.raw.unread().starts_with(b"MTrk"),
            self.raw.error(ErrorKind::BadTrackMagic(track))
        );
        self.raw.read_slice(4)?;
        let len = self.raw.read_u32()?;
        let base = self.raw.offset();
        let region = self.raw.read_slice(len as usize)?;
        Ok(EventIter::new(track, ByteCursor::with_base(region, base)))
    }

    /// Frame every remaining track, then decode them all.
    ///
    /// Framing happens first so that decoding can be spread across threads. Errors are reported
    /// as if tracks were framed and decoded one after the other: a decode error in a track
    /// takes precedence over a framing error in any later track.
    pub fn collect_events(self) -> Result<Vec<Track<'a>>> {
        let (tracks, framing) = self.frame_all();
        let decoded = decode_all(tracks, EventIter::collect_events)?;
        framing.map_or(Ok(decoded), Err)
    }

    pub fn collect_bytemapped(self) -> Result<Vec<Vec<(&'a [u8], Event<'a>)>>> {
        let (tracks, framing) = self.frame_all();
        let decoded = decode_all(tracks, EventIter::collect_bytemapped)?;
        framing.map_or(Ok(decoded), Err)
    }

    /// Frame tracks up to the first framing error, if any.
    fn frame_all(self) -> (Vec<EventIter<'a>>, Option<Error>) {
        let mut tracks = Vec::with_capacity(self.track_count as usize - self.track_idx);
        for framed in self {
            match framed {
                Ok(track) => tracks.push(track),
                Err(err) => return (tracks, Some(err)),
            }
        }
        (tracks, None)
    }
}
impl<'a> Iterator for TrackIter<'a> {
    type Item = Result<EventIter<'a>>;

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.track_count as usize - self.track_idx;
        (0, Some(left))
    }

    fn next(&mut self) -> Option<Result<EventIter<'a>>> {
        if self.track_idx >= self.track_count as usize {
            return None;
        }
        let framed = self.frame().in_track(self.track_idx);
        match framed {
            Ok(_) => self.track_idx += 1,
            //Do not attempt to frame the rest of the file from a corrupted position
            Err(_) => self.track_idx = self.track_count as usize,
        }
        Some(framed)
    }
}

/// Decode every framed track, in parallel if enabled and worthwhile.
///
/// Tracks are decoded independently, since running status never crosses a track boundary.
fn decode_all<'a, T, F>(tracks: Vec<EventIter<'a>>, decode: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(EventIter<'a>) -> Result<T> + Sync + Send,
{
    let total_bytes: usize = tracks.iter().map(|track| track.unread().len()).sum();
    let decoded: Vec<Result<T>> = crate::map_tracks(tracks, total_bytes, decode);
    //Report the lowest failing track, regardless of which thread saw it first
    decoded.into_iter().collect()
}

/// An iterator of events over a single track.
/// Allows deferring the decoding of tracks for later, on an on-demand basis.
///
/// Holds the only decoder state, the running status, which starts out unset for every track.
/// After an error the iterator is fused, since the cursor may sit in the middle of a message.
#[derive(Clone, Debug)]
pub struct EventIter<'a> {
    track: usize,
    raw: ByteCursor<'a>,
    running_status: Option<u8>,
}
impl<'a> EventIter<'a> {
    fn new(track: usize, raw: ByteCursor<'a>) -> EventIter<'a> {
        EventIter {
            track,
            raw,
            running_status: None,
        }
    }

    /// The index of the track being decoded.
    pub fn track(&self) -> usize {
        self.track
    }

    /// Get the remaining unread bytes.
    pub fn unread(&self) -> &'a [u8] {
        self.raw.unread()
    }

    /// Get the current running status of the track.
    pub fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Decode the next event along with the raw bytes it spans.
    fn next_bytemapped(&mut self) -> Option<Result<(&'a [u8], Event<'a>)>> {
        if self.raw.is_empty() {
            return None;
        }
        let before = self.raw.unread();
        let read_result = Event::read(&mut self.raw, &mut self.running_status).in_track(self.track);
        Some(match read_result {
            Ok(ev) => {
                let consumed = before.len() - self.raw.remaining();
                Ok((&before[..consumed], ev))
            }
            Err(err) => {
                self.raw = ByteCursor::with_base(&[], self.raw.offset());
                Err(err)
            }
        })
    }

    pub fn collect_events(self) -> Result<Track<'a>> {
        let track = self.track;
        let mut events = Vec::with_capacity(self.raw.remaining() / 3);
        for ev in self {
            events.push(ev?);
        }
        trace!(track, events = events.len(), "decoded track");
        Ok(events)
    }

    pub fn collect_bytemapped(mut self) -> Result<Vec<(&'a [u8], Event<'a>)>> {
        let mut events = Vec::with_capacity(self.raw.remaining() / 3);
        while let Some(ev) = self.next_bytemapped() {
            events.push(ev?);
        }
        trace!(track = self.track, events = events.len(), "decoded track");
        Ok(events)
    }
}
impl<'a> Iterator for EventIter<'a> {
    type Item = Result<Event<'a>>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_bytemapped()
            .map(|res| res.map(|(_raw, ev)| ev))
    }
}
