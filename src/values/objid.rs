use core::fmt::{self, Display};

/// An object reference: a signed directory id, or an anonymous id that has
/// no directory entry and is reachable only through value graphs.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Objid {
    pub id: i64,
    pub anonymous: bool,
}

/// The non-object, `#-1`.
pub const NOTHING: Objid = Objid {
    id: -1,
    anonymous: false,
};

/// The system object, `#0`; primitive prototypes hang off its properties.
pub const SYSTEM: Objid = Objid {
    id: 0,
    anonymous: false,
};

impl Objid {
    pub fn new(id: i64) -> Self {
        Objid {
            id,
            anonymous: false,
        }
    }

    pub fn new_anonymous(id: i64) -> Self {
        Objid {
            id,
            anonymous: true,
        }
    }

    pub fn is_nothing(self) -> bool {
        self == NOTHING
    }
}

impl Display for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anonymous {
            write!(f, "*anonymous*")
        } else {
            write!(f, "#{}", self.id)
        }
    }
}

impl From<i64> for Objid {
    fn from(id: i64) -> Self {
        Objid::new(id)
    }
}
