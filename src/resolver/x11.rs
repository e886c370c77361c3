use anyhow::Result;
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection,
};

use super::{ActivityResolver, Resolution};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>()[0])
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).into_owned())
}

/// Resolver for x11 environments. There is no address bar introspection
/// here, so a browser window resolves to its title like any other window.
pub struct X11Resolver {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
}

impl X11Resolver {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom,
        })
    }

    #[instrument(skip(self))]
    fn get_active_title(&self) -> Result<String> {
        let setup = self.connection.get_setup();

        // Currently the application only supports 1 x11 screen.
        let root = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .unwrap()
            .root();

        let active_window = get_active_window(&self.connection, &root, self.active_window_atom)?;
        get_name(&self.connection, active_window, self.window_name_atom)
    }
}

impl ActivityResolver for X11Resolver {
    #[instrument(skip(self))]
    fn resolve_current_activity(&mut self) -> Result<Resolution> {
        let _ = self.connection.send_request(&GrabServer {});

        let result = self.get_active_title();
        let _ = self.connection.send_request(&UngrabServer {});

        Ok(Resolution::Activity(result?))
    }
}
