use std::fmt;

use crate::Packet;

/// Minimal packet for unit tests: rendered as its name, e.g. `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Msg(&'static str);

pub(crate) fn msg(name: &'static str) -> Msg {
    Msg(name)
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Packet for Msg {
    type Kind = &'static str;

    fn kind(&self) -> Self::Kind {
        self.0
    }
}
