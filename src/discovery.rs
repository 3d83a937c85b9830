//! Room discovery.

use crate::error::TransportError;
use crate::protocol::{Frame, RoomSummary};
use crate::transport::{Connector, Credential, LinkOptions, TransportEvent, TransportSession};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Asks the host for its open rooms over a short-lived link.
#[instrument(skip(connector, credential))]
pub async fn list_rooms<C: Connector>(
    connector: Arc<C>,
    credential: Credential,
    options: LinkOptions,
) -> Result<Vec<RoomSummary>, TransportError> {
    let mut link = TransportSession::new(connector, credential, options);
    let mut inbound = link.connect().await?;
    link.send(Frame::ListRooms)?;

    let wait = async {
        loop {
            match inbound.next().await {
                Some(TransportEvent::Message(Frame::Rooms { rooms })) => return Ok(rooms),
                Some(TransportEvent::Message(other)) => {
                    debug!(kind = other.kind(), "Ignoring frame while listing rooms");
                }
                Some(TransportEvent::Malformed(e)) => warn!(error = %e, "Dropping malformed frame"),
                Some(TransportEvent::Disconnected(_)) | None => {
                    return Err(TransportError::ConnectionLost);
                }
            }
        }
    };
    let result = tokio::time::timeout(options.connect_timeout, wait)
        .await
        .unwrap_or(Err(TransportError::HandshakeTimeout));

    link.disconnect().await;
    result
}
