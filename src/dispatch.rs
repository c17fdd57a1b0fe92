//! Blocking event loop
//!
//! [`execute`] selects a handler's events on its window, then waits,
//! decodes and routes until the server connection goes away.
//!
//! Which kinds a handler takes is a property of its type: [`Handler::HANDLED`]
//! is a constant, so for every kind outside it the routing branch is dead
//! code after monomorphization and the event is dropped without decoding.

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};
use x11rb::protocol::xproto::*;

use crate::event::{Envelope, EventInterest, EventKinds};
use crate::session::Session;
use crate::window::Window;

/// A window that reacts to some of the events delivered to it.
///
/// Override the method for each kind listed in [`HANDLED`](Self::HANDLED).
/// Methods for other kinds are never called.
#[allow(unused_variables)]
pub trait Handler {
    /// Events selected on the window before the loop starts.
    const EVENT_MASK: EventInterest;

    /// Events decoded and passed to the matching method.
    const HANDLED: EventKinds;

    fn window(&self) -> &Window<'_>;

    fn key_press(&mut self, event: KeyPressEvent) -> Result<()> {
        Ok(())
    }
    fn key_release(&mut self, event: KeyReleaseEvent) -> Result<()> {
        Ok(())
    }
    fn button_press(&mut self, event: ButtonPressEvent) -> Result<()> {
        Ok(())
    }
    fn button_release(&mut self, event: ButtonReleaseEvent) -> Result<()> {
        Ok(())
    }
    fn motion_notify(&mut self, event: MotionNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn enter_notify(&mut self, event: EnterNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn leave_notify(&mut self, event: LeaveNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn focus_in(&mut self, event: FocusInEvent) -> Result<()> {
        Ok(())
    }
    fn focus_out(&mut self, event: FocusOutEvent) -> Result<()> {
        Ok(())
    }
    fn keymap_notify(&mut self, event: KeymapNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn expose(&mut self, event: ExposeEvent) -> Result<()> {
        Ok(())
    }
    fn graphics_exposure(&mut self, event: GraphicsExposureEvent) -> Result<()> {
        Ok(())
    }
    fn no_exposure(&mut self, event: NoExposureEvent) -> Result<()> {
        Ok(())
    }
    fn visibility_notify(&mut self, event: VisibilityNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn create_notify(&mut self, event: CreateNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn destroy_notify(&mut self, event: DestroyNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn unmap_notify(&mut self, event: UnmapNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn map_notify(&mut self, event: MapNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn map_request(&mut self, event: MapRequestEvent) -> Result<()> {
        Ok(())
    }
    fn reparent_notify(&mut self, event: ReparentNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn configure_notify(&mut self, event: ConfigureNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn configure_request(&mut self, event: ConfigureRequestEvent) -> Result<()> {
        Ok(())
    }
    fn gravity_notify(&mut self, event: GravityNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn resize_request(&mut self, event: ResizeRequestEvent) -> Result<()> {
        Ok(())
    }
    fn circulate_notify(&mut self, event: CirculateNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn circulate_request(&mut self, event: CirculateRequestEvent) -> Result<()> {
        Ok(())
    }
    fn property_notify(&mut self, event: PropertyNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn selection_clear(&mut self, event: SelectionClearEvent) -> Result<()> {
        Ok(())
    }
    fn selection_request(&mut self, event: SelectionRequestEvent) -> Result<()> {
        Ok(())
    }
    fn selection_notify(&mut self, event: SelectionNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn colormap_notify(&mut self, event: ColormapNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn client_message(&mut self, event: ClientMessageEvent) -> Result<()> {
        Ok(())
    }
    fn mapping_notify(&mut self, event: MappingNotifyEvent) -> Result<()> {
        Ok(())
    }
    fn ge_generic(&mut self, event: GeGenericEvent) -> Result<()> {
        Ok(())
    }
}

macro_rules! route {
    ($handler:ident, $envelope:ident, $kind:expr, {
        $($code:ident => $flag:ident, $method:ident($record:ty);)*
    }) => {
        match $kind {
            $(
                $code => {
                    if const { H::HANDLED.contains(EventKinds::$flag) } {
                        trace!(event = stringify!($method), "dispatch");
                        let record = $envelope
                            .release_as::<$record>()
                            .context(concat!("decoding ", stringify!($method)))?;
                        $handler.$method(record)?;
                    } else {
                        trace!(event = stringify!($method), "unimplemented");
                    }
                }
            )*
            0 => {
                let code = $envelope.as_bytes().and_then(|b| b.get(1).copied());
                warn!(code, sequence = $envelope.sequence(), "x11 error");
            }
            other => debug!(kind = other, "unknown event"),
        }
    };
}

/// Routes one received event to `handler`.
pub fn dispatch<H: Handler>(handler: &mut H, envelope: &mut Envelope) -> Result<()> {
    let Some(kind) = envelope.kind() else {
        return Ok(());
    };

    route!(handler, envelope, kind, {
        KEY_PRESS_EVENT => KEY_PRESS, key_press(KeyPressEvent);
        KEY_RELEASE_EVENT => KEY_RELEASE, key_release(KeyReleaseEvent);
        BUTTON_PRESS_EVENT => BUTTON_PRESS, button_press(ButtonPressEvent);
        BUTTON_RELEASE_EVENT => BUTTON_RELEASE, button_release(ButtonReleaseEvent);
        MOTION_NOTIFY_EVENT => MOTION_NOTIFY, motion_notify(MotionNotifyEvent);
        ENTER_NOTIFY_EVENT => ENTER_NOTIFY, enter_notify(EnterNotifyEvent);
        LEAVE_NOTIFY_EVENT => LEAVE_NOTIFY, leave_notify(LeaveNotifyEvent);
        FOCUS_IN_EVENT => FOCUS_IN, focus_in(FocusInEvent);
        FOCUS_OUT_EVENT => FOCUS_OUT, focus_out(FocusOutEvent);
        KEYMAP_NOTIFY_EVENT => KEYMAP_NOTIFY, keymap_notify(KeymapNotifyEvent);
        EXPOSE_EVENT => EXPOSE, expose(ExposeEvent);
        GRAPHICS_EXPOSURE_EVENT => GRAPHICS_EXPOSURE, graphics_exposure(GraphicsExposureEvent);
        NO_EXPOSURE_EVENT => NO_EXPOSURE, no_exposure(NoExposureEvent);
        VISIBILITY_NOTIFY_EVENT => VISIBILITY_NOTIFY, visibility_notify(VisibilityNotifyEvent);
        CREATE_NOTIFY_EVENT => CREATE_NOTIFY, create_notify(CreateNotifyEvent);
        DESTROY_NOTIFY_EVENT => DESTROY_NOTIFY, destroy_notify(DestroyNotifyEvent);
        UNMAP_NOTIFY_EVENT => UNMAP_NOTIFY, unmap_notify(UnmapNotifyEvent);
        MAP_NOTIFY_EVENT => MAP_NOTIFY, map_notify(MapNotifyEvent);
        MAP_REQUEST_EVENT => MAP_REQUEST, map_request(MapRequestEvent);
        REPARENT_NOTIFY_EVENT => REPARENT_NOTIFY, reparent_notify(ReparentNotifyEvent);
        CONFIGURE_NOTIFY_EVENT => CONFIGURE_NOTIFY, configure_notify(ConfigureNotifyEvent);
        CONFIGURE_REQUEST_EVENT => CONFIGURE_REQUEST, configure_request(ConfigureRequestEvent);
        GRAVITY_NOTIFY_EVENT => GRAVITY_NOTIFY, gravity_notify(GravityNotifyEvent);
        RESIZE_REQUEST_EVENT => RESIZE_REQUEST, resize_request(ResizeRequestEvent);
        CIRCULATE_NOTIFY_EVENT => CIRCULATE_NOTIFY, circulate_notify(CirculateNotifyEvent);
        CIRCULATE_REQUEST_EVENT => CIRCULATE_REQUEST, circulate_request(CirculateRequestEvent);
        PROPERTY_NOTIFY_EVENT => PROPERTY_NOTIFY, property_notify(PropertyNotifyEvent);
        SELECTION_CLEAR_EVENT => SELECTION_CLEAR, selection_clear(SelectionClearEvent);
        SELECTION_REQUEST_EVENT => SELECTION_REQUEST, selection_request(SelectionRequestEvent);
        SELECTION_NOTIFY_EVENT => SELECTION_NOTIFY, selection_notify(SelectionNotifyEvent);
        COLORMAP_NOTIFY_EVENT => COLORMAP_NOTIFY, colormap_notify(ColormapNotifyEvent);
        CLIENT_MESSAGE_EVENT => CLIENT_MESSAGE, client_message(ClientMessageEvent);
        MAPPING_NOTIFY_EVENT => MAPPING_NOTIFY, mapping_notify(MappingNotifyEvent);
        GE_GENERIC_EVENT => GE_GENERIC, ge_generic(GeGenericEvent);
    });

    Ok(())
}

/// Runs the event loop for `handler` until the event stream ends.
///
/// Returns the number of events received. Handler errors stop the loop and
/// are returned as they are.
pub fn execute<H: Handler>(session: &Session, handler: &mut H) -> Result<usize> {
    handler.window().select_events(H::EVENT_MASK)?;
    session.flush();

    let mut received = 0usize;
    let mut envelope = Envelope::new();
    while envelope.wait(session) {
        received += 1;
        trace!(
            sequence = envelope.sequence(),
            window = handler.window().id(),
            synthetic = envelope.is_synthetic(),
            "execution"
        );
        dispatch(handler, &mut envelope)?;
        session.flush();
    }

    debug!(received, "event stream ended");
    Ok(received)
}
