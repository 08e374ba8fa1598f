use anyhow::{anyhow, Result};
use tracing::{debug, instrument};
use xcb::{
    x::{self, Atom, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection,
};

use crate::daemon::storage::entities::ActivityKey;

use super::WindowProbe;

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    result
        .value::<Window>()
        .first()
        .copied()
        .ok_or_else(|| anyhow!("No active window"))
}

pub fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value::<u8>()).into_owned())
}

pub struct X11Probe {
    connection: Connection,
    root: Window,
    active_window_atom: Atom,
    window_name_atom: Atom,
}

impl X11Probe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;

        // Currently the application only supports 1 x11 screen.
        let root = connection
            .get_setup()
            .roots()
            .nth(preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("Screen {preferred_screen} doesn't exist"))?
            .root();
        Ok(Self {
            connection,
            root,
            active_window_atom,
            window_name_atom,
        })
    }

    #[instrument(skip(self))]
    fn get_active_title(&self) -> Result<String> {
        let active_window = get_active_window(&self.connection, self.root, self.active_window_atom)?;
        get_name(&self.connection, active_window, self.window_name_atom)
    }
}

impl WindowProbe for X11Probe {
    fn probe(&mut self) -> Option<ActivityKey> {
        self.get_active_title()
            .inspect_err(|e| debug!("Failed to get active window {e:?}"))
            .ok()
            .and_then(ActivityKey::new_opt)
    }
}
