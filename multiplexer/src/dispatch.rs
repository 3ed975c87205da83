//! The single send/receive step shared by every I/O path (`gen_io` in the original):
//! send the rewritten request, sanity-check the reply's echoed endpoint, and clear the
//! Driver Map binding the moment a peer turns out to be dead.

use crate::driver_map::DriverMap;
use devmux_shared::endpoint::Endpoint;
use devmux_shared::ipc::{IpcError, Transport};
use devmux_shared::message::WireMessage;

#[derive(Debug)]
pub enum DispatchError {
    /// The peer is gone for good; `driver_map` has already been cleared for it.
    Dead(IpcError),
    /// The peer is transiently unavailable; nothing was cleared.
    Locked,
    /// The reply's echoed endpoint didn't match what was sent.
    Protocol,
}

pub fn dispatch(
    transport: &dyn Transport,
    driver_map: &mut DriverMap,
    driver: Endpoint,
    msg: &WireMessage,
) -> Result<WireMessage, DispatchError> {
    match transport.send_receive(driver, msg) {
        Ok(reply) => {
            if reply.reply_endpoint != msg.io_endpoint {
                log::error!(
                    "strange device reply from driver {driver}: expected endpoint {}, got {}",
                    msg.io_endpoint,
                    reply.reply_endpoint
                );
                return Err(DispatchError::Protocol);
            }
            Ok(reply)
        }
        Err(IpcError::Locked) => {
            log::warn!("ELOCKED talking to driver {driver}");
            Err(DispatchError::Locked)
        }
        Err(e) if e.is_dead_peer() => {
            log::error!("dead driver {driver}: {e}");
            driver_map.unmap_by_endpoint(driver);
            Err(DispatchError::Dead(e))
        }
        Err(e) => panic!("dispatch: unexpected IPC failure talking to driver {driver}: {e:?}"),
    }
}
