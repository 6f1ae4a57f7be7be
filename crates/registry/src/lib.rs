//! In-memory registration table for the rendezvous coordinator.
//!
//! Keyed by the server's public IP, each entry records the
//! `(ip, private_port, public_port)` triple a POST advertised, an optional
//! stream handle id if the POST arrived over a stream connection, and an
//! absolute deadline after which the entry is stale.
//!
//! Nothing in this crate touches a socket or spawns a task: it is plain,
//! synchronous bookkeeping, exactly the part of the coordinator that is
//! safe to own and mutate from a single thread with no internal locking.

pub mod clock;

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use ahash::HashMap;
use codec::Endpoint;

pub use clock::Clock;

/// Default per-IP cap on live + stale-but-not-yet-evicted entries.
pub const DEFAULT_CAP: usize = 5;

/// Default entry lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Opaque identifier for a stream handle owned by the coordinator binary.
///
/// The registry never dereferences this id; it only carries it so the
/// dispatcher can later look the handle up in its own arena to send a
/// reply or close it. See the "arena of handles indexed by integer id"
/// design note.
pub type HandleId = u64;

/// One record in the coordinator's table describing one server's current
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub deadline: u64,
    pub stream_handle: Option<HandleId>,
    pub endpoint: Endpoint,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        now <= self.deadline
    }
}

/// A snapshot of a matched entry, returned by [`RegistrationTable::lookup`]
/// and [`RegistrationTable::consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub endpoint: Endpoint,
    pub stream_handle: Option<HandleId>,
}

/// Whether an `upsert` created a fresh entry or refreshed a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A live entry with the same `(ip, public_port)` existed and was
    /// refreshed in place.
    Refreshed,
    /// No live entry existed; a new one was inserted (possibly reusing an
    /// expired slot, possibly evicting the oldest on cap overflow).
    Inserted,
}

/// The result of an `upsert`: what happened, plus the handle id of any
/// stream connection that is no longer reachable through the table
/// (because it was overwritten by a refresh, or evicted by the FIFO cap)
/// and so should be closed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    pub outcome: UpsertOutcome,
    pub closed_handle: Option<HandleId>,
    /// Whether inserting this entry required evicting the oldest one for
    /// `ip` because the per-IP cap was reached. Always `false` when
    /// `outcome` is `Refreshed`.
    pub evicted: bool,
}

pub struct RegistrationTable {
    table: HashMap<Ipv4Addr, VecDeque<Entry>>,
    cap: usize,
    ttl: u64,
}

impl RegistrationTable {
    pub fn new(cap: usize, ttl: u64) -> Self {
        Self {
            table: HashMap::default(),
            cap,
            ttl,
        }
    }

    /// `upsert(ip, endpoint, stream_handle, now)`.
    ///
    /// Locates an entry in `table[ip]` whose `public_port` matches. If
    /// found, refreshes it in place. Otherwise inserts a new entry,
    /// evicting the oldest on cap overflow.
    pub fn upsert(
        &mut self,
        ip: Ipv4Addr,
        endpoint: Endpoint,
        stream_handle: Option<HandleId>,
        now: u64,
    ) -> UpsertReport {
        let entries = self.table.entry(ip).or_insert_with(VecDeque::new);

        if let Some(existing) = entries
            .iter_mut()
            .find(|entry| entry.endpoint.public_port == endpoint.public_port)
        {
            let closed_handle = existing.stream_handle.filter(|h| Some(*h) != stream_handle);

            existing.deadline = now + self.ttl;
            existing.endpoint = endpoint;
            existing.stream_handle = stream_handle;

            return UpsertReport {
                outcome: UpsertOutcome::Refreshed,
                closed_handle,
                evicted: false,
            };
        }

        let mut closed_handle = None;
        let mut evicted = false;
        if entries.len() >= self.cap {
            if let Some(removed) = entries.pop_front() {
                closed_handle = removed.stream_handle;
            }
            evicted = true;
        }

        entries.push_back(Entry {
            deadline: now + self.ttl,
            stream_handle,
            endpoint,
        });

        UpsertReport {
            outcome: UpsertOutcome::Inserted,
            closed_handle,
            evicted,
        }
    }

    /// `lookup(ip, public_port, now)`.
    ///
    /// Scans `table[ip]` in order, skipping stale entries, and returns the
    /// first live match. Does not mutate the table.
    pub fn lookup(&self, ip: Ipv4Addr, public_port: u16, now: u64) -> Option<Hit> {
        let entries = self.table.get(&ip)?;

        entries
            .iter()
            .filter(|entry| entry.is_live(now))
            .find(|entry| entry.endpoint.public_port == public_port)
            .map(|entry| Hit {
                endpoint: entry.endpoint,
                stream_handle: entry.stream_handle,
            })
    }

    /// `consume_stream` fused with `lookup`: on a live match, zeroes the
    /// entry's deadline so a subsequent lookup treats it as stale. This
    /// implements at-most-once server notification per POSTed entry (P8).
    ///
    /// Returns the matched entry's snapshot so the dispatcher can borrow
    /// its stream handle (if any) to notify the server, and reply to the
    /// asker, before the handle is closed.
    pub fn consume(&mut self, ip: Ipv4Addr, public_port: u16, now: u64) -> Option<Hit> {
        let entries = self.table.get_mut(&ip)?;

        let entry = entries
            .iter_mut()
            .filter(|entry| entry.is_live(now))
            .find(|entry| entry.endpoint.public_port == public_port)?;

        let hit = Hit {
            endpoint: entry.endpoint,
            stream_handle: entry.stream_handle,
        };

        entry.deadline = 0;
        Some(hit)
    }

    /// Number of entries (live or stale-but-not-evicted) currently stored
    /// for `ip`. Exposed for tests and the optional introspection API.
    pub fn len(&self, ip: Ipv4Addr) -> usize {
        self.table.get(&ip).map_or(0, VecDeque::len)
    }

    /// Number of *live* entries for `ip` as of `now`.
    pub fn live_len(&self, ip: Ipv4Addr, now: u64) -> usize {
        self.table
            .get(&ip)
            .map_or(0, |entries| entries.iter().filter(|e| e.is_live(now)).count())
    }
}
