// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-connection state, association state and lifecycle edge events

use core::net::Ipv4Addr;

use crate::frame::{Cid, CID_COUNT};

/// State of one connection slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Connection is open
    pub connected: bool,
    /// Data was lost or the socket failed; cleared on the next connect
    pub error: bool,
    /// Connection uses SSL
    pub ssl: bool,
    /// Remote address, unspecified if unknown
    pub remote_ip: Ipv4Addr,
    /// Remote port, 0 if unknown
    pub remote_port: u16,
    /// Local port, 0 if unknown
    pub local_port: u16,
}

impl Connection {
    /// Closed slot
    pub const EMPTY: Self = Self {
        connected: false,
        error: false,
        ssl: false,
        remote_ip: Ipv4Addr::UNSPECIFIED,
        remote_port: 0,
        local_port: 0,
    };
}

impl Default for Connection {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Edge-triggered lifecycle events, collected between two polls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Events(u8);

impl Events {
    /// Associated with an access point
    pub const ASSOCIATED: Self = Self(1 << 0);
    /// Association lost
    pub const DISASSOCIATED: Self = Self(1 << 1);
    /// Network connection manager opened its connection
    pub const NCM_CONNECTED: Self = Self(1 << 2);
    /// Network connection manager's connection closed
    pub const NCM_DISCONNECTED: Self = Self(1 << 3);

    /// No events
    pub const fn empty() -> Self {
        Self(0)
    }

    /// No events pending
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Clear `other` and report whether it was set
    pub fn take(&mut self, other: Self) -> bool {
        let was_set = self.contains(other);
        self.remove(other);
        was_set
    }
}

/// Connection table plus association state
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    connections: [Connection; CID_COUNT],
    associated: bool,
    ncm_auto_cid: Option<Cid>,
    events: Events,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    /// All slots closed, not associated
    pub const fn new() -> Self {
        Self {
            connections: [Connection::EMPTY; CID_COUNT],
            associated: false,
            ncm_auto_cid: None,
            events: Events::empty(),
        }
    }

    /// Back to the initial state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Close every slot but keep association and pending events
    pub fn reset_connections(&mut self) {
        self.connections = [Connection::EMPTY; CID_COUNT];
    }

    /// State of one connection
    pub fn get(&self, cid: Cid) -> &Connection {
        &self.connections[cid.index()]
    }

    /// Associated with an access point
    pub fn is_associated(&self) -> bool {
        self.associated
    }

    /// Connection opened by the network connection manager, if any
    pub fn ncm_auto_cid(&self) -> Option<Cid> {
        self.ncm_auto_cid
    }

    /// Events collected since the last [`take_event`](Self::take_event)
    pub fn events(&self) -> Events {
        self.events
    }

    /// Clear one event, reporting whether it was pending
    pub fn take_event(&mut self, event: Events) -> bool {
        self.events.take(event)
    }

    /// Flag data loss or a socket failure on `cid`
    pub fn mark_error(&mut self, cid: Cid) {
        self.connections[cid.index()].error = true;
    }

    /// Flag `cid` as an SSL connection
    pub fn set_ssl(&mut self, cid: Cid, ssl: bool) {
        self.connections[cid.index()].ssl = ssl;
    }

    /// Record a new connection on `cid`
    ///
    /// A slot that still looks connected is disconnected first, since a
    /// disconnect notification must have been missed.
    pub fn connect(
        &mut self,
        cid: Cid,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        local_port: u16,
        ncm: bool,
    ) {
        if self.connections[cid.index()].connected {
            self.disconnect(cid);
        }

        if ncm {
            self.ncm_auto_cid = Some(cid);
            // A reconnect must not go unnoticed, even with a disconnect pending
            self.events.insert(Events::NCM_CONNECTED);
        }

        let conn = &mut self.connections[cid.index()];
        conn.remote_ip = remote_ip;
        conn.remote_port = remote_port;
        conn.local_port = local_port;
        conn.error = false;
        conn.connected = true;
    }

    /// Record that `cid` closed
    pub fn disconnect(&mut self, cid: Cid) {
        let conn = &mut self.connections[cid.index()];
        if !conn.connected {
            return;
        }
        conn.connected = false;
        conn.ssl = false;

        if self.ncm_auto_cid == Some(cid) {
            self.ncm_auto_cid = None;
            // Connected and disconnected within one poll: report neither
            if !self.events.take(Events::NCM_CONNECTED) {
                self.events.insert(Events::NCM_DISCONNECTED);
            }
        }
    }

    /// Record a successful association
    pub fn associate(&mut self) {
        // A disassociation was missed; start from a clean slate
        if self.associated {
            self.disassociate();
        }
        self.associated = true;
        self.events.insert(Events::ASSOCIATED);
    }

    /// Record a lost association, closing every open connection with error
    pub fn disassociate(&mut self) {
        if !self.associated {
            return;
        }

        if !self.events.take(Events::ASSOCIATED) {
            self.events.insert(Events::DISASSOCIATED);
        }
        self.associated = false;

        for cid in Cid::all() {
            if self.connections[cid.index()].connected {
                self.mark_error(cid);
                self.disconnect(cid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::new(n).unwrap()
    }

    #[test]
    fn test_disassociation_cascades() {
        let mut table = ConnectionTable::new();
        table.associate();
        table.take_event(Events::ASSOCIATED);
        table.connect(cid(1), Ipv4Addr::UNSPECIFIED, 0, 0, false);
        table.connect(cid(3), Ipv4Addr::UNSPECIFIED, 0, 0, false);

        table.disassociate();

        for n in [1, 3] {
            let c = table.get(cid(n));
            assert!(!c.connected);
            assert!(c.error);
        }
        assert_eq!(table.events(), Events::DISASSOCIATED);
        assert!(!table.is_associated());
    }

    #[test]
    fn test_associate_then_disassociate_cancels() {
        let mut table = ConnectionTable::new();
        table.associate();
        table.disassociate();
        assert!(table.events().is_empty());
    }

    #[test]
    fn test_reassociate_keeps_both_edges() {
        let mut table = ConnectionTable::new();
        table.associate();
        table.take_event(Events::ASSOCIATED);
        table.disassociate();
        table.associate();
        assert!(table.events().contains(Events::DISASSOCIATED));
        assert!(table.events().contains(Events::ASSOCIATED));
    }

    #[test]
    fn test_ncm_connect_disconnect_cancels() {
        let mut table = ConnectionTable::new();
        table.connect(cid(2), Ipv4Addr::UNSPECIFIED, 0, 0, true);
        assert_eq!(table.ncm_auto_cid(), Some(cid(2)));
        table.disconnect(cid(2));
        assert!(table.events().is_empty());
        assert_eq!(table.ncm_auto_cid(), None);
    }

    #[test]
    fn test_connect_clears_error_and_reconnects() {
        let mut table = ConnectionTable::new();
        table.connect(cid(4), Ipv4Addr::new(10, 0, 0, 2), 80, 1024, false);
        table.mark_error(cid(4));
        table.set_ssl(cid(4), true);
        table.connect(cid(4), Ipv4Addr::new(10, 0, 0, 3), 81, 1025, false);

        let c = table.get(cid(4));
        assert!(c.connected);
        assert!(!c.error);
        assert!(!c.ssl);
        assert_eq!(c.remote_port, 81);
    }

    #[test]
    fn test_ncm_reconnect_reports_both_edges() {
        let mut table = ConnectionTable::new();
        table.connect(cid(0), Ipv4Addr::UNSPECIFIED, 0, 0, true);
        table.take_event(Events::NCM_CONNECTED);
        table.connect(cid(0), Ipv4Addr::UNSPECIFIED, 0, 0, true);
        assert!(table.events().contains(Events::NCM_DISCONNECTED));
        assert!(table.events().contains(Events::NCM_CONNECTED));
    }
}
