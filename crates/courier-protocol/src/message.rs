//! The `Message` trait: what every pooled payload type implements.

use serde::{Serialize, de::DeserializeOwned};

use crate::{MessageKind, ProtocolError};

/// A protocol payload that can be pooled, sent reliably, and interpreted.
///
/// The lifecycle gates live beside the payload (the pool wraps each
/// instance together with a [`Lifecycle`](crate::Lifecycle)), so a message
/// type only describes its own fields.
///
/// # Example
///
/// ```rust
/// use courier_protocol::{Message, MessageKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Chat {
///     text: String,
/// }
///
/// impl Message for Chat {
///     const KIND: MessageKind = MessageKind(1);
///
///     fn clear(&mut self) {
///         // Keep the String's allocation for the next user.
///         self.text.clear();
///     }
/// }
/// ```
pub trait Message: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire tag for this type. Must be unique per node.
    const KIND: MessageKind;

    /// Builds a brand-new instance when the pool has nothing idle.
    ///
    /// Defaults to [`Default::default`]. Override when construction can
    /// fail (e.g. it reserves an external resource); the error is
    /// returned from the pool's `acquire` unchanged.
    fn create() -> Result<Self, ProtocolError> {
        Ok(Self::default())
    }

    /// Called when the instance goes back to the pool.
    ///
    /// Drop stale payload here so the next user starts clean. Keeping
    /// allocated capacity (e.g. `Vec::clear`) is the point of pooling.
    fn clear(&mut self) {}
}
