use core::fmt;
use thiserror::Error as ThisError;

/// Represents an error while decoding a Standard Midi File.
///
/// Wraps an [`ErrorKind`](enum.ErrorKind.html) together with the absolute byte offset into the
/// input buffer where decoding failed and, if the failure happened while framing or decoding a
/// track, the index of that track.
///
/// All errors are fatal: a file that produces an error yields no partial result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{kind}{}", Location(.kind, .offset, .track))]
pub struct Error {
    kind: ErrorKind,
    offset: usize,
    track: Option<usize>,
}
impl Error {
    /// Create a new error of the given kind at the given absolute byte offset.
    #[inline]
    pub fn new(kind: ErrorKind, offset: usize) -> Error {
        Error {
            kind,
            offset,
            track: None,
        }
    }

    /// What went wrong.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Absolute offset into the input buffer at which the error was detected.
    ///
    /// Meaningless, and always 0, for [`ErrorKind::TrackOutOfRange`](enum.ErrorKind.html),
    /// which is not a decoding error.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The index of the track being framed or decoded when the error occurred, if any.
    #[inline]
    pub fn track(&self) -> Option<usize> {
        self.track
    }

    #[inline]
    pub(crate) fn with_track(mut self, track: usize) -> Error {
        self.track = Some(track);
        self
    }
}

/// Where in the input an error happened, if it refers to the input at all.
struct Location<'a>(&'a ErrorKind, &'a usize, &'a Option<usize>);
impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let ErrorKind::TrackOutOfRange(_) = self.0 {
            return Ok(());
        }
        write!(f, " at byte {}", self.1)?;
        match *self.2 {
            Some(track) => write!(f, " in track {}", track),
            None => Ok(()),
        }
    }
}

/// The type of error that occurred while decoding.
///
/// Every kind is fatal to the decode of the current file; there are no retries, since binary
/// framing errors are not transient.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum ErrorKind {
    /// The file does not begin with the `MThd` tag.
    #[error("file does not begin with the MThd header tag")]
    BadMagic,
    /// The header chunk declares a length other than 6.
    #[error("header length is {0}, expected 6")]
    BadHeaderLength(u32),
    /// The format field is not 0, 1 or 2.
    #[error("invalid smf format {0}")]
    BadFormat(u16),
    /// A format 0 file declares a track count other than 1.
    #[error("format 0 file declares {0} tracks, expected 1")]
    FormatTrackMismatch(u16),
    /// The time division uses the SMPTE encoding (top bit set).
    #[error("smpte time division is not supported")]
    UnsupportedTimeFormat,
    /// The time division declares zero ticks per quarter note.
    #[error("time division declares zero ticks per quarter note")]
    ZeroTicksPerBeat,
    /// A track chunk does not begin with the `MTrk` tag.
    #[error("track {0} does not begin with the MTrk tag")]
    BadTrackMagic(usize),
    /// Input ended before the expected amount of bytes could be read.
    #[error("unexpected end of data")]
    OutOfBounds,
    /// A variable-length quantity continued past 4 bytes (28 bits).
    #[error("variable-length quantity longer than 4 bytes")]
    VarLenOverflow,
    /// A data byte appeared where a status byte was expected, and no channel status byte has
    /// been seen yet in the track.
    #[error("running status used before any channel status byte")]
    NoRunningStatus,
    /// A status byte that does not map to any message class.
    #[error("invalid midi message type (status {0:#04x})")]
    InvalidMessageType(u8),
    /// A big-endian integer read wider than 4 bytes was requested.
    #[error("cannot read a {0}-byte integer, at most 4 bytes fit")]
    IntegerTooWide(usize),
    /// A reconstruction was requested for a track the file does not contain.
    ///
    /// This does not refer to a position in the input: the offset of such errors is always 0.
    #[error("track {0} is out of range")]
    TrackOutOfRange(usize),
}

pub(crate) trait ResultExt<T> {
    /// Tag an error with the track it happened in, unless it is already tagged.
    fn in_track(self, track: usize) -> StdResult<T, Error>;
}
impl<T> ResultExt<T> for StdResult<T, Error> {
    #[inline]
    fn in_track(self, track: usize) -> StdResult<T, Error> {
        self.map_err(|err| match err.track {
            Some(_) => err,
            None => err.with_track(track),
        })
    }
}

/// The result type used by the MIDI decoder.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
