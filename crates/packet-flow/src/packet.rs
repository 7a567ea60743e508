//! The packet capability a flow needs.

use std::fmt;

/// A protocol packet as seen by a flow.
///
/// The engine never inspects packet fields. It needs a type discriminator
/// for diagnostics and a canonical rendering: two packets match iff their
/// renderings are equal character for character.
pub trait Packet: fmt::Display + fmt::Debug + Clone + Send + Sync + 'static {
    /// Type discriminator, e.g. an enum of protocol packet types.
    type Kind: fmt::Debug + PartialEq + Send + Sync;

    fn kind(&self) -> Self::Kind;

    /// Canonical rendering used for matching. Defaults to `Display`.
    fn render(&self) -> String {
        self.to_string()
    }
}
