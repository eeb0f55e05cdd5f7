use crate::frame::Frame;
use thiserror::Error;
use tracing::debug;

/// Value written to contact-channel slots that carry no contact.
pub const SENTINEL: f32 = -1.0;

pub const NUM_CHANNELS: usize = 2;
pub const FORCE_CHANNEL: usize = 0;
pub const CONTACT_CHANNEL: usize = 1;

const CHANNEL_NAMES: [&str; NUM_CHANNELS] = ["force", "contacts"];

/// Values emitted per contact on the contact channel: x, y, total force.
pub const CONTACT_STRIDE: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    #[error("channel lengths differ: force has {force} samples, contacts has {contacts}")]
    ChannelLengthMismatch { force: usize, contacts: usize },
}

/// Shape of the output the host should allocate for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub num_channels: usize,
    /// `None` until a device is acquired; the host keeps its own default.
    pub num_samples: Option<usize>,
    pub start_index: usize,
}

impl OutputDescriptor {
    pub fn new(num_samples: Option<usize>) -> Self {
        Self {
            num_channels: NUM_CHANNELS,
            num_samples,
            start_index: 0,
        }
    }

    pub fn channel_name(&self, index: usize) -> Option<&'static str> {
        CHANNEL_NAMES.get(index).copied()
    }
}

/// The two host-owned channels filled in place on each tick.
pub struct OutputSink<'a> {
    force: &'a mut [f32],
    contacts: &'a mut [f32],
}

impl<'a> OutputSink<'a> {
    pub fn new(force: &'a mut [f32], contacts: &'a mut [f32]) -> Result<Self, OutputError> {
        if force.len() != contacts.len() {
            return Err(OutputError::ChannelLengthMismatch {
                force: force.len(),
                contacts: contacts.len(),
            });
        }
        Ok(Self { force, contacts })
    }

    pub fn num_samples(&self) -> usize {
        self.force.len()
    }

    pub fn force(&self) -> &[f32] {
        &self.force[..]
    }

    pub fn contacts(&self) -> &[f32] {
        &self.contacts[..]
    }
}

/// Owned storage for both channels, for callers without a host buffer.
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffers {
    pub force: Vec<f32>,
    pub contacts: Vec<f32>,
}

impl ChannelBuffers {
    pub fn new(num_samples: usize) -> Self {
        Self {
            force: vec![0.0; num_samples],
            contacts: vec![SENTINEL; num_samples],
        }
    }

    pub fn num_samples(&self) -> usize {
        self.force.len()
    }

    /// Grow or shrink both channels, keeping existing values where they fit.
    pub fn resize(&mut self, num_samples: usize) {
        self.force.resize(num_samples, 0.0);
        self.contacts.resize(num_samples, SENTINEL);
    }

    pub fn sink(&mut self) -> OutputSink<'_> {
        OutputSink {
            force: &mut self.force,
            contacts: &mut self.contacts,
        }
    }

    /// Contact triples written on the last projection, stopping at the first
    /// sentinel.
    pub fn contact_triples(&self) -> impl Iterator<Item = (f32, f32, f32)> + '_ {
        self.contacts
            .chunks_exact(CONTACT_STRIDE)
            .take_while(|c| c[0] != SENTINEL)
            .map(|c| (c[0], c[1], c[2]))
    }
}

/// What a projection actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Projection {
    pub num_samples: usize,
    /// Force values copied from the frame.
    pub force_written: usize,
    pub contacts_written: usize,
    /// Contacts that did not fit as whole triples.
    pub contacts_dropped: usize,
}

impl Projection {
    pub fn is_truncated(&self) -> bool {
        self.force_written < self.num_samples || self.contacts_dropped > 0
    }
}

/// Copy a frame into the two output channels.
///
/// Channel 0 receives the force grid; cells past the end of the frame's
/// force array are zeroed. Channel 1 receives `(x, y, total_force)` for each
/// contact in frame order, as many whole triples as fit, and the remaining
/// slots are set to [`SENTINEL`]. Each channel is bounded by its own
/// length.
pub fn project(frame: &Frame, sink: &mut OutputSink<'_>) -> Projection {
    let n = sink.num_samples();

    let force_written = n.min(frame.force.len());
    sink.force[..force_written].copy_from_slice(&frame.force[..force_written]);
    sink.force[force_written..].fill(0.0);

    let capacity = sink.contacts.len() / CONTACT_STRIDE;
    let contacts_written = frame.contacts.len().min(capacity);
    for (slot, contact) in sink
        .contacts
        .chunks_exact_mut(CONTACT_STRIDE)
        .zip(&frame.contacts)
    {
        slot[0] = contact.x;
        slot[1] = contact.y;
        slot[2] = contact.total_force;
    }
    sink.contacts[contacts_written * CONTACT_STRIDE..].fill(SENTINEL);

    let projection = Projection {
        num_samples: n,
        force_written,
        contacts_written,
        contacts_dropped: frame.contacts.len() - contacts_written,
    };
    if projection.is_truncated() {
        debug!(
            num_samples = n,
            force_len = frame.force.len(),
            contacts = frame.contacts.len(),
            contacts_written,
            "frame truncated to output size"
        );
    }
    projection
}
