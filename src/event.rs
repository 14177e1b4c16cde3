//! All sort of events and their decoders.

use crate::{prelude::*, primitive::ByteCursor};

/// Represents a decoded SMF track event.
///
/// Consists of a delta time (in MIDI ticks relative to the previous event in the same track) and
/// the actual event. Absolute time is never stored; it is derived by accumulating deltas.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Event<'a> {
    /// How many MIDI ticks after the previous event should this event fire.
    pub delta: u32,
    /// The class of event along with its class-specific data.
    pub kind: EventKind<'a>,
}
impl<'a> Event<'a> {
    /// Advances the cursor and updates `running_status`.
    ///
    /// In case of failure the cursor might be left in the middle of an event!
    pub(crate) fn read(
        raw: &mut ByteCursor<'a>,
        running_status: &mut Option<u8>,
    ) -> Result<Event<'a>> {
        let delta = raw.read_varlen()?;
        let kind = EventKind::read(raw, running_status)?;
        Ok(Event { delta, kind })
    }

    /// The raw data bytes of this event, not including status, meta type or length prefixes.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.kind.data()
    }

    /// The MIDI channel of channel voice and channel mode messages.
    #[inline]
    pub fn channel(&self) -> Option<u8> {
        self.kind.channel()
    }

    /// Interpret this event as a meta message, if it is one.
    #[inline]
    pub fn meta(&self) -> Option<MetaMessage<'a>> {
        match self.kind {
            EventKind::Meta { meta_type, data } => Some(MetaMessage::from_raw(meta_type, data)),
            _ => None,
        }
    }
}

/// Represents the different classes of SMF events and their associated data.
///
/// It notably does *not* include the timing of the event; the `Event` struct is responsible
/// for this.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum EventKind<'a> {
    /// A message associated to a MIDI channel carrying musical data.
    ///
    /// Status byte in the range `0x80 ..= 0xEF`, except control changes on controllers 120
    /// through 127.
    ChannelVoice {
        /// The MIDI channel (0-15) that this event is associated with.
        channel: u8,
        /// The channel voice message type.
        message: VoiceMessage,
        /// The data bytes, as many as `message.data_len()`.
        data: &'a [u8],
    },
    /// A control change on controllers 120 through 127, which alters how a channel responds
    /// rather than carrying musical data.
    ChannelMode {
        /// The MIDI channel (0-15) that this event is associated with.
        channel: u8,
        /// The channel mode message type.
        message: ModeMessage,
        /// The two data bytes: controller number and value.
        data: &'a [u8],
    },
    /// A meta-message, giving extra information for correct playback, like tempo, track name,
    /// end of track, etc...
    ///
    /// Status byte `0xFF`. Use [`Event::meta`](struct.Event.html#method.meta) for a typed view.
    Meta {
        /// The meta type byte following the `0xFF` status.
        meta_type: u8,
        /// The payload, not including the length prefix.
        data: &'a [u8],
    },
    /// A System Exclusive (or system common) message, carrying arbitrary data.
    ///
    /// Status byte in the range `0xF0 ..= 0xF7`. The data is length-prefixed in the file, and
    /// the prefix is not included here.
    SysEx {
        /// The raw status byte.
        status: u8,
        /// The payload, not including the length prefix.
        data: &'a [u8],
    },
    /// A System Realtime message, which carries no data.
    ///
    /// Status byte in the range `0xF8 ..= 0xFE`.
    SysRealtime {
        /// The raw status byte.
        status: u8,
    },
}
impl<'a> EventKind<'a> {
    fn read(raw: &mut ByteCursor<'a>, running_status: &mut Option<u8>) -> Result<EventKind<'a>> {
        let status_at = *raw;
        let first = raw
            .peek()
            .ok_or_else(|| raw.error(ErrorKind::OutOfBounds))?;
        if first == 0xFF {
            // Meta events never touch running status
            raw.read_u8()?;
            let meta_type = raw.read_u8()?;
            let data = raw.read_varlen_slice()?;
            return Ok(EventKind::Meta { meta_type, data });
        }
        let status = if first < 0x80 {
            // Running status! The byte is the first data byte, so leave it unread
            running_status.ok_or_else(|| raw.error(ErrorKind::NoRunningStatus))?
        } else {
            raw.read_u8()?;
            first
        };
        let channel = status & 0x0F;
        //Delegate further decoding depending on the message class
        let kind = match status >> 4 {
            0x8..=0xE => {
                *running_status = Some(status);
                match ModeMessage::from_status(status, raw.peek()) {
                    Some(message) => EventKind::ChannelMode {
                        channel,
                        message,
                        data: raw.read_slice(2)?,
                    },
                    None => {
                        let message = VoiceMessage::from_status(status)
                            .ok_or_else(|| status_at.error(ErrorKind::InvalidMessageType(status)))?;
                        EventKind::ChannelVoice {
                            channel,
                            message,
                            data: raw.read_slice(message.data_len())?,
                        }
                    }
                }
            }
            // System messages leave channel running status as-is
            0xF if channel <= 0x7 => EventKind::SysEx {
                status,
                data: raw.read_varlen_slice()?,
            },
            0xF => EventKind::SysRealtime { status },
            _ => bail!(status_at.error(ErrorKind::InvalidMessageType(status))),
        };
        Ok(kind)
    }

    /// The raw data bytes carried by this event.
    pub fn data(&self) -> &'a [u8] {
        match *self {
            EventKind::ChannelVoice { data, .. }
            | EventKind::ChannelMode { data, .. }
            | EventKind::Meta { data, .. }
            | EventKind::SysEx { data, .. } => data,
            EventKind::SysRealtime { .. } => &[],
        }
    }

    /// The MIDI channel of channel messages, `None` for any other class.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            EventKind::ChannelVoice { channel, .. } | EventKind::ChannelMode { channel, .. } => {
                Some(channel)
            }
            EventKind::Meta { .. } | EventKind::SysEx { .. } | EventKind::SysRealtime { .. } => {
                None
            }
        }
    }

    /// A single numeric code identifying the message type within its class.
    ///
    /// - Channel voice: the status byte with the channel masked off (`0x80`, `0x90`, ...).
    /// - Channel mode: `0xB0 + (controller - 119)`, that is `0xB1 ..= 0xB8`.
    /// - Meta: the meta type byte.
    /// - SysEx and realtime: the raw status byte.
    pub fn type_code(&self) -> u8 {
        match *self {
            EventKind::ChannelVoice { message, .. } => message.type_code(),
            EventKind::ChannelMode { message, .. } => message.type_code(),
            EventKind::Meta { meta_type, .. } => meta_type,
            EventKind::SysEx { status, .. } | EventKind::SysRealtime { status } => status,
        }
    }
}

/// The type of a channel voice message.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum VoiceMessage {
    /// Stop playing a note. Data: key, velocity.
    NoteOff,
    /// Start playing a note. Data: key, velocity.
    ///
    /// By convention a `NoteOn` with a velocity of 0 is equivalent to a `NoteOff`.
    NoteOn,
    /// Modify the velocity of a note after it has been played. Data: key, pressure.
    PolyPressure,
    /// Modify the value of a MIDI controller. Data: controller, value.
    ControlChange,
    /// Change the program (instrument) of a channel. Data: program.
    ProgramChange,
    /// Change the pressure of a whole channel at once. Data: pressure.
    ChannelPressure,
    /// Set the pitch bend of a channel. Data: LSB, MSB.
    PitchBend,
}
impl VoiceMessage {
    /// Channel voice messages have a known length.
    pub(crate) fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    pub(crate) fn from_status(status: u8) -> Option<VoiceMessage> {
        Some(match status >> 4 {
            0x8 => VoiceMessage::NoteOff,
            0x9 => VoiceMessage::NoteOn,
            0xA => VoiceMessage::PolyPressure,
            0xB => VoiceMessage::ControlChange,
            0xC => VoiceMessage::ProgramChange,
            0xD => VoiceMessage::ChannelPressure,
            0xE => VoiceMessage::PitchBend,
            _ => return None,
        })
    }

    /// Get the raw status nibble for this message type.
    pub fn status_nibble(self) -> u8 {
        match self {
            VoiceMessage::NoteOff => 0x8,
            VoiceMessage::NoteOn => 0x9,
            VoiceMessage::PolyPressure => 0xA,
            VoiceMessage::ControlChange => 0xB,
            VoiceMessage::ProgramChange => 0xC,
            VoiceMessage::ChannelPressure => 0xD,
            VoiceMessage::PitchBend => 0xE,
        }
    }

    /// The status byte with the channel bits cleared.
    #[inline]
    pub fn type_code(self) -> u8 {
        self.status_nibble() << 4
    }

    /// How many data bytes follow the status byte.
    #[inline]
    pub fn data_len(self) -> usize {
        Self::msg_length(self.type_code())
    }
}

/// The type of a channel mode message, sent as a control change on controllers 120-127.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ModeMessage {
    /// Controller 120.
    AllSoundOff,
    /// Controller 121.
    ResetAllControllers,
    /// Controller 122.
    LocalControl,
    /// Controller 123.
    AllNotesOff,
    /// Controller 124.
    OmniOff,
    /// Controller 125.
    OmniOn,
    /// Controller 126.
    MonoOn,
    /// Controller 127.
    PolyOn,
}
impl ModeMessage {
    /// Classify a status byte and the byte following it as a channel mode message.
    pub(crate) fn from_status(status: u8, next: Option<u8>) -> Option<ModeMessage> {
        if status >> 4 != 0xB {
            return None;
        }
        Self::from_controller(next?)
    }

    /// Convert a controller number in `120 ..= 127` to its mode message.
    pub fn from_controller(controller: u8) -> Option<ModeMessage> {
        Some(match controller {
            120 => ModeMessage::AllSoundOff,
            121 => ModeMessage::ResetAllControllers,
            122 => ModeMessage::LocalControl,
            123 => ModeMessage::AllNotesOff,
            124 => ModeMessage::OmniOff,
            125 => ModeMessage::OmniOn,
            126 => ModeMessage::MonoOn,
            127 => ModeMessage::PolyOn,
            _ => return None,
        })
    }

    /// The controller number this message is sent on.
    pub fn controller(self) -> u8 {
        match self {
            ModeMessage::AllSoundOff => 120,
            ModeMessage::ResetAllControllers => 121,
            ModeMessage::LocalControl => 122,
            ModeMessage::AllNotesOff => 123,
            ModeMessage::OmniOff => 124,
            ModeMessage::OmniOn => 125,
            ModeMessage::MonoOn => 126,
            ModeMessage::PolyOn => 127,
        }
    }

    /// `0xB0 + (controller - 119)`, ranging `0xB1 ..= 0xB8`.
    #[inline]
    pub fn type_code(self) -> u8 {
        0xB0 + (self.controller() - 119)
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage<'a> {
    /// For `Format::Sequential` MIDI file types, `TrackNumber` can be empty, and defaults to
    /// the track index.
    TrackNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(&'a [u8]),
    /// A copyright notice.
    Copyright(&'a [u8]),
    /// Information about the name of the track.
    TrackName(&'a [u8]),
    /// Information about the name of the current instrument.
    InstrumentName(&'a [u8]),
    /// Arbitrary lyric information associated to an instant.
    Lyric(&'a [u8]),
    /// Arbitrary marker text associated to an instant.
    Marker(&'a [u8]),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(&'a [u8]),
    /// Information about the name of the current program.
    ProgramName(&'a [u8]),
    /// Name of the device that this file was intended to be played with.
    DeviceName(&'a [u8]),
    /// Number of the MIDI channel that this file was intended to be played with.
    MidiChannel(u8),
    /// Number of the MIDI port that this file was intended to be played with.
    MidiPort(u8),
    /// Obligatory at track end.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note), a 24-bit value.
    ///
    /// Usually appears at the beginning of a track, before any midi events are sent, but there
    /// are no guarantees.
    Tempo(u32),
    /// The raw 5 bytes of an SMPTE offset (hour, minute, second, frame, subframe).
    SmpteOffset(&'a [u8]),
    /// In order of the MIDI specification, numerator, denominator, MIDI clocks per click, 32nd
    /// notes per quarter.
    TimeSignature(u8, u8, u8, u8),
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    /// `false` indicates a major scale, `true` indicates a minor scale.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    SequencerSpecific(&'a [u8]),
    /// An unknown meta-message, or a known one with a payload too short to interpret.
    ///
    /// The first `u8` is the raw meta type byte.
    Unknown(u8, &'a [u8]),
}
impl<'a> MetaMessage<'a> {
    /// Interpret a meta type byte and its payload.
    pub fn from_raw(meta_type: u8, data: &'a [u8]) -> MetaMessage<'a> {
        match (meta_type, data) {
            (0x00, [hi, lo, ..]) => MetaMessage::TrackNumber(Some(u16::from_be_bytes([*hi, *lo]))),
            (0x00, _) => MetaMessage::TrackNumber(None),
            (0x01, _) => MetaMessage::Text(data),
            (0x02, _) => MetaMessage::Copyright(data),
            (0x03, _) => MetaMessage::TrackName(data),
            (0x04, _) => MetaMessage::InstrumentName(data),
            (0x05, _) => MetaMessage::Lyric(data),
            (0x06, _) => MetaMessage::Marker(data),
            (0x07, _) => MetaMessage::CuePoint(data),
            (0x08, _) => MetaMessage::ProgramName(data),
            (0x09, _) => MetaMessage::DeviceName(data),
            (0x20, [chan, ..]) => MetaMessage::MidiChannel(*chan),
            (0x21, [port, ..]) => MetaMessage::MidiPort(*port),
            (0x2F, _) => MetaMessage::EndOfTrack,
            (0x51, [d0, d1, d2, ..]) => MetaMessage::Tempo(
                u32::from(*d0) << 16 | u32::from(*d1) << 8 | u32::from(*d2),
            ),
            (0x54, _) if data.len() >= 5 => MetaMessage::SmpteOffset(&data[..5]),
            (0x58, [num, den, clocks, notes, ..]) => {
                MetaMessage::TimeSignature(*num, *den, *clocks, *notes)
            }
            (0x59, [sharps, minor, ..]) => MetaMessage::KeySignature(*sharps as i8, *minor != 0),
            (0x7F, _) => MetaMessage::SequencerSpecific(data),
            _ => MetaMessage::Unknown(meta_type, data),
        }
    }
}
