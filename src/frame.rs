/// Lifecycle state of a contact within a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContactState {
    #[default]
    Invalid,
    Start,
    Move,
    End,
}

impl From<u32> for ContactState {
    fn from(raw: u32) -> Self {
        match raw {
            1 => ContactState::Start,
            2 => ContactState::Move,
            3 => ContactState::End,
            _ => ContactState::Invalid,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Contact {
    pub id: u8,
    pub state: ContactState,
    /// Position in millimetres from the sensor's top-left corner.
    pub x: f32,
    pub y: f32,
    /// Sum of force under the contact, in grams.
    pub total_force: f32,
    pub area: f32,
}

/// One snapshot read from the device. A session keeps a single instance and
/// overwrites it on every fetch.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Row-major per-cell force, `num_rows * num_cols` values.
    pub force: Vec<f32>,
    pub contacts: Vec<Contact>,
    pub lost_frames: u32,
}

impl Frame {
    pub fn with_capacity(cells: usize, max_contacts: usize) -> Self {
        Self {
            force: Vec::with_capacity(cells),
            contacts: Vec::with_capacity(max_contacts),
            lost_frames: 0,
        }
    }

    /// Empty the frame without giving back its allocation.
    pub fn clear(&mut self) {
        self.force.clear();
        self.contacts.clear();
        self.lost_frames = 0;
    }
}
