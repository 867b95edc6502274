//! Digest chain (C2) — tamper-evident hash chain over canonicalized events.
//!
//! Each appended event is bound to its predecessor by folding the prior
//! terminal digest and a per-event salt into a SHA-256 hash of the event's
//! canonical bytes. The chain never exposes a way to construct a [`crate::event::Event`]
//! with a digest triple that didn't come out of [`DigestChain::append`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::CoreError;
use crate::event::{Event, EventType, PendingEvent};
use crate::serializer::canonical_bytes;

/// Width in hex characters of a SHA-256 digest, and of the genesis sentinel.
const DIGEST_HEX_LEN: usize = 64;

/// Monotonic counter used to derive per-event salts. Never backed by raw
/// wall-clock nanoseconds: a fixed base [`Instant`] is captured once, and
/// every subsequent value is that base plus a strictly increasing counter,
/// so two events can never collide even under a system clock adjustment.
#[derive(Debug)]
pub struct MonotonicClock {
    base: Instant,
    counter: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            counter: AtomicU64::new(0),
        }
    }

    /// Return the next strictly increasing precision timestamp, expressed as
    /// nanoseconds elapsed since the clock's base instant.
    pub fn next(&self) -> u64 {
        let ordinal = self.counter.fetch_add(1, Ordering::SeqCst);
        let elapsed = self.base.elapsed().as_nanos() as u64;
        // fold the ordinal in so two calls within the same nanosecond still differ
        elapsed.wrapping_add(ordinal)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in the chain's link index: everything needed to re-verify a
/// single event's binding without re-reading the full event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLink {
    pub sequence: u64,
    pub event_id: Uuid,
    pub digest: String,
    pub prior_digest: String,
    pub salt: String,
}

/// A self-contained, portable export of a chain's link index, used by the
/// audit certificate (C9) and by out-of-process verifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExport {
    pub genesis: String,
    pub terminal_digest: String,
    pub links: Vec<ChainLink>,
}

/// Outcome of a full chain verification, matching the §4.2 contract
/// `{ valid, links_verified, first_invalid_index, elapsed_ms, terminal }`
/// bit-for-bit. `elapsed_ms` is excluded from equality: two calls to
/// `verify` over identical input may legitimately clock different wall
/// time, so comparing it would make the struct useless in tests.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub valid: bool,
    pub links_verified: u64,
    pub first_invalid_index: Option<u64>,
    pub elapsed_ms: f64,
    pub terminal: String,
    pub reason: Option<String>,
}

impl PartialEq for ChainVerification {
    fn eq(&self, other: &Self) -> bool {
        self.valid == other.valid
            && self.links_verified == other.links_verified
            && self.first_invalid_index == other.first_invalid_index
            && self.terminal == other.terminal
            && self.reason == other.reason
    }
}

/// `salt = sha256(ascii(counter_value))`, hex-encoded.
fn derive_salt(precision_timestamp: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(precision_timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// `digest = sha256(prior_digest || canonical_bytes(event) || salt)`, hex-encoded.
fn derive_digest(canonical: &[u8], prior_digest: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prior_digest.as_bytes());
    hasher.update(canonical);
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// A tamper-evident, append-only digest chain. Owns no lock itself; callers
/// (`kontext-engine::Logger`) serialize access with their own mutex around
/// the whole capture-serialize-hash-push sequence.
#[derive(Debug)]
pub struct DigestChain {
    terminal_digest: String,
    links: Vec<ChainLink>,
    clock: MonotonicClock,
}

impl DigestChain {
    /// Start a fresh chain, terminal digest initialized to [`GENESIS`].
    pub fn new() -> Self {
        Self {
            terminal_digest: genesis_digest(),
            links: Vec::new(),
            clock: MonotonicClock::new(),
        }
    }

    /// Resume a chain from a prior export, continuing sequencing and digest
    /// derivation from where it left off. Used by `EventStore::restore`.
    pub fn resume(export: ChainExport) -> Self {
        Self {
            terminal_digest: export.terminal_digest,
            links: export.links,
            clock: MonotonicClock::new(),
        }
    }

    /// Current terminal digest (the rolling head of the chain).
    pub fn terminal(&self) -> &str {
        &self.terminal_digest
    }

    /// Number of events bound into the chain so far.
    pub fn len(&self) -> u64 {
        self.links.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Bind `pending` into the chain: assign its precision timestamp, salt,
    /// prior digest, and digest, push its link, advance the terminal digest,
    /// and return the fully chained [`Event`].
    ///
    /// The returned event's `event_type` and `payload` are asserted to agree
    /// before binding — a mismatch is a caller bug, not a runtime condition,
    /// so construction fails fast with [`CoreError::PayloadMismatch`].
    pub fn append(&mut self, pending: PendingEvent) -> Result<Event, CoreError> {
        if !pending.payload.matches_type(pending.event_type) {
            return Err(CoreError::PayloadMismatch {
                event_type: pending.event_type,
            });
        }

        let sequence = self.links.len() as u64;
        let precision_timestamp = self.clock.next();
        let mut event = Event::from_pending(pending, precision_timestamp);

        let canonical = canonical_bytes(&event)?;
        let salt = derive_salt(precision_timestamp);
        let prior_digest = self.terminal_digest.clone();
        let digest = derive_digest(&canonical, &prior_digest, &salt);

        event.digest = digest.clone();
        event.prior_digest = prior_digest.clone();
        event.salt = salt.clone();

        self.links.push(ChainLink {
            sequence,
            event_id: event.id,
            digest: digest.clone(),
            prior_digest,
            salt,
        });
        self.terminal_digest = digest;

        Ok(event)
    }

    /// Verify a single link in isolation, recomputing its digest from the
    /// provided event body. Requires the caller to know the expected
    /// `prior_digest` (the prior link's digest, or [`GENESIS`] at sequence 0).
    /// Returns `Ok(false)` (not an `Err`) for a tamper/reorder mismatch —
    /// `Err` is reserved for the event body failing to canonicalize at all.
    /// The caller, which knows the real link index, attaches that index to
    /// whatever report it builds.
    pub fn verify_link(event: &Event, expected_prior_digest: &str) -> Result<bool, CoreError> {
        if event.prior_digest != expected_prior_digest {
            return Ok(false);
        }
        let canonical = canonical_bytes(event)?;
        let recomputed = derive_digest(&canonical, &event.prior_digest, &event.salt);
        Ok(recomputed == event.digest)
    }

    /// Verify every event in `events` (in store order) against this chain's
    /// recorded links, walking the prior-digest linkage from [`GENESIS`].
    pub fn verify(&self, events: &[Event]) -> ChainVerification {
        let start = Instant::now();
        if events.len() != self.links.len() {
            return ChainVerification {
                valid: false,
                links_verified: 0,
                first_invalid_index: Some(0),
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                terminal: self.terminal_digest.clone(),
                reason: Some(format!(
                    "event count {} does not match link count {}",
                    events.len(),
                    self.links.len()
                )),
            };
        }
        let mut expected_prior = genesis_digest();
        for (index, (link, event)) in self.links.iter().zip(events.iter()).enumerate() {
            let link_ok = match Self::verify_link(event, &expected_prior) {
                Ok(ok) => ok && link.digest == event.digest,
                Err(_) => false,
            };
            if !link_ok {
                return ChainVerification {
                    valid: false,
                    links_verified: index as u64,
                    first_invalid_index: Some(index as u64),
                    elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                    terminal: self.terminal_digest.clone(),
                    reason: Some(format!("link at index {index} failed to recompute")),
                };
            }
            expected_prior = event.digest.clone();
        }
        if expected_prior != self.terminal_digest {
            return ChainVerification {
                valid: false,
                links_verified: self.links.len() as u64,
                first_invalid_index: Some(self.links.len() as u64),
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                terminal: self.terminal_digest.clone(),
                reason: Some("final digest does not match chain terminal digest".into()),
            };
        }
        ChainVerification {
            valid: true,
            links_verified: self.links.len() as u64,
            first_invalid_index: None,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            terminal: self.terminal_digest.clone(),
            reason: None,
        }
    }

    /// Export the chain's link index for external verification or for
    /// persistence alongside the event store.
    pub fn export(&self) -> ChainExport {
        ChainExport {
            genesis: genesis_digest(),
            terminal_digest: self.terminal_digest.clone(),
            links: self.links.clone(),
        }
    }

    /// Re-verify a previously exported chain against the event bodies that
    /// produced it, without needing a live `DigestChain` instance. Pure:
    /// depends only on `export` and `events`, additionally confirming the
    /// recomputed final digest equals `export.terminal_digest` (the same
    /// check `verify` already performs against the live terminal digest).
    pub fn verify_exported(export: &ChainExport, events: &[Event]) -> ChainVerification {
        let chain = DigestChain {
            terminal_digest: export.terminal_digest.clone(),
            links: export.links.clone(),
            clock: MonotonicClock::new(),
        };
        chain.verify(events)
    }

    /// Rebuild a chain purely from restored event bodies (no separate link
    /// persistence is required — every event already carries its own
    /// `digest`/`prior_digest`/`salt`). This is how `restore()` resolves
    /// spec.md §9 Open Question 2: `terminal_digest` is never trusted from a
    /// cached value, it is walked fresh from the restored events every time.
    ///
    /// Rejects (spec.md §9 Open Question 1) rather than skips any event
    /// whose digest triple is empty, and rejects any event whose
    /// `prior_digest` does not chain from its predecessor.
    pub fn rebuild_from_events(events: &[Event]) -> Result<Self, CoreError> {
        let mut links = Vec::with_capacity(events.len());
        let mut expected_prior = genesis_digest();
        for (sequence, event) in events.iter().enumerate() {
            if event.digest.is_empty() || event.prior_digest.is_empty() || event.salt.is_empty() {
                return Err(CoreError::MissingDigestFields { event_id: event.id });
            }
            if !Self::verify_link(event, &expected_prior)? {
                return Err(CoreError::ChainBroken {
                    sequence: sequence as u64,
                    reason: "restored event does not chain from its predecessor".into(),
                });
            }
            links.push(ChainLink {
                sequence: sequence as u64,
                event_id: event.id,
                digest: event.digest.clone(),
                prior_digest: event.prior_digest.clone(),
                salt: event.salt.clone(),
            });
            expected_prior = event.digest.clone();
        }
        Ok(Self {
            terminal_digest: expected_prior,
            links,
            clock: MonotonicClock::new(),
        })
    }
}

impl Default for DigestChain {
    fn default() -> Self {
        Self::new()
    }
}

/// The sentinel previous-digest for the first event in a chain: 64 ASCII
/// zeros, never a real digest output (SHA-256 outputs are statistically
/// indistinguishable from random and collide with this value with
/// negligible probability).
pub fn genesis_digest() -> String {
    "0".repeat(DIGEST_HEX_LEN)
}
