use std::fmt;

/// An addressable message destination, resolved by sessions when creating
/// producers.
///
/// Only queue destinations are currently usable; topics are recognized but
/// rejected as unsupported rather than invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A named queue.
    Queue(String),

    /// A named topic.
    Topic(String),
}

impl Destination {
    pub fn queue<S: Into<String>>(name: S) -> Destination {
        Destination::Queue(name.into())
    }

    pub fn topic<S: Into<String>>(name: S) -> Destination {
        Destination::Topic(name.into())
    }

    /// The destination's name, independent of its kind.
    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(name) | Destination::Topic(name) => name,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue {}", name),
            Destination::Topic(name) => write!(f, "topic {}", name),
        }
    }
}
