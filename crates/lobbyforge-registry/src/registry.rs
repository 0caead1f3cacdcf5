//! The server registry: heartbeats, allocation, release and job polling.
//!
//! # Concurrency
//!
//! The registry is shared by every lobby task and by every compute
//! server's heartbeat, so each mutation is a conditional write against
//! the version read just before it. Two lobbies that both see the same
//! Ready lease race on the Ready→InUse write; the store lets exactly one
//! of them through and the loser moves on to the next lease.

use std::sync::Arc;

use lobbyforge_protocol::{MatchId, ServerAddress, UserId};
use lobbyforge_store::{StorageBackend, StorageObject};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{
    JobAssignment, LeaseState, RegistryConfig, RegistryError, ServerLease, now_millis,
};

/// Tracks compute-server leases and hands Ready servers to lobbies.
///
/// Cheap to share: wrap it in an `Arc` and give a clone to every lobby.
pub struct ServerRegistry {
    store: Arc<dyn StorageBackend>,
    config: RegistryConfig,
}

impl ServerRegistry {
    pub fn new(store: Arc<dyn StorageBackend>, config: RegistryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Claims the first live Ready server for `match_id`.
    ///
    /// Scans every lease in registry order. Leases whose heartbeat is
    /// older than the TTL are deleted on the way and never returned. The
    /// first Ready lease is switched to InUse and a [`JobAssignment`] is
    /// written for it.
    ///
    /// Returns `Ok(None)` when no server qualifies; the caller retries on
    /// a later tick.
    ///
    /// # Errors
    /// Store failures are returned as-is. If the job write fails after the
    /// lease was claimed, the lease is put back to Ready first.
    pub fn acquire(&self, match_id: MatchId) -> Result<Option<UserId>, RegistryError> {
        let now = now_millis();
        let servers = &self.config.servers_collection;
        let owner = &self.config.owner;

        for obj in self.store.list(owner, servers)? {
            let lease: ServerLease = match decode(&obj) {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::warn!(key = %obj.key, error = %e, "skipping unreadable lease");
                    continue;
                }
            };

            if lease.is_stale(now, self.config.heartbeat_ttl) {
                self.reclaim_stale(&obj, &lease, now)?;
                continue;
            }

            if !lease.is_ready() {
                continue;
            }

            let claimed = ServerLease {
                state: LeaseState::InUse,
                ..lease
            };
            let written = match self.store.write(
                servers,
                &obj.key,
                owner,
                encode(&claimed)?,
                Some(obj.version),
            ) {
                Ok(written) => written,
                Err(e) if e.is_conflict() => {
                    tracing::debug!(
                        server_id = %claimed.server_id,
                        %match_id,
                        "lease changed under us, trying the next one"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let job = JobAssignment {
                server_id: claimed.server_id.clone(),
                match_id,
                assigned_at: now,
            };
            if let Err(e) = self.write_job(&obj.key, &job) {
                self.roll_back_claim(&obj.key, claimed, written.version);
                return Err(e);
            }

            tracing::info!(
                server_id = %job.server_id,
                %match_id,
                address = %job_address(&written),
                "server allocated"
            );
            return Ok(Some(job.server_id));
        }

        tracing::debug!(%match_id, "no ready server available");
        Ok(None)
    }

    /// Returns a server to the pool.
    ///
    /// Any job the server has not picked up yet is discarded, then the
    /// lease is rewritten as Ready with a fresh heartbeat. The address is
    /// kept. Does nothing if the lease has already been reclaimed.
    pub fn release(&self, server_id: &UserId) -> Result<(), RegistryError> {
        let servers = &self.config.servers_collection;
        let owner = &self.config.owner;

        if self
            .store
            .delete(&self.config.jobs_collection, server_id.as_str(), owner, None)?
        {
            tracing::debug!(%server_id, "discarded unconsumed job");
        }

        for _ in 0..self.config.max_write_attempts {
            let Some(obj) = self.store.read(servers, server_id.as_str(), owner)? else {
                tracing::debug!(%server_id, "release of unknown lease ignored");
                return Ok(());
            };
            let lease: ServerLease = decode(&obj)?;
            let released = ServerLease {
                state: LeaseState::Ready,
                heartbeat_at: now_millis(),
                ..lease
            };

            match self.store.write(
                servers,
                server_id.as_str(),
                owner,
                encode(&released)?,
                Some(obj.version),
            ) {
                Ok(_) => {
                    tracing::info!(%server_id, "server released");
                    return Ok(());
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Contended {
            server_id: server_id.clone(),
            attempts: self.config.max_write_attempts,
        })
    }

    /// Records a liveness signal from a compute server.
    ///
    /// An existing lease only gets a new `heartbeat_at`; its state and
    /// address are kept, so a heartbeat never frees a server that is
    /// hosting a match. An unknown server is registered as Ready at
    /// `address`. Returns the lease as stored.
    pub fn heartbeat(
        &self,
        server_id: &UserId,
        address: ServerAddress,
    ) -> Result<ServerLease, RegistryError> {
        let servers = &self.config.servers_collection;
        let owner = &self.config.owner;

        for _ in 0..self.config.max_write_attempts {
            let now = now_millis();
            let (lease, expected) = match self.store.read(servers, server_id.as_str(), owner)? {
                Some(obj) => match decode::<ServerLease>(&obj) {
                    Ok(existing) => (
                        ServerLease {
                            heartbeat_at: now,
                            ..existing
                        },
                        obj.version,
                    ),
                    Err(e) => {
                        tracing::warn!(%server_id, error = %e, "replacing unreadable lease");
                        (
                            ServerLease::new(server_id.clone(), address.clone(), now),
                            obj.version,
                        )
                    }
                },
                None => {
                    tracing::info!(%server_id, %address, "server registered");
                    (ServerLease::new(server_id.clone(), address.clone(), now), 0)
                }
            };

            match self.store.write(
                servers,
                server_id.as_str(),
                owner,
                encode(&lease)?,
                Some(expected),
            ) {
                Ok(_) => {
                    tracing::trace!(%server_id, state = ?lease.state, "heartbeat");
                    return Ok(lease);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Contended {
            server_id: server_id.clone(),
            attempts: self.config.max_write_attempts,
        })
    }

    /// Takes the pending job for `server_id`, if any.
    ///
    /// Read-then-delete with at-most-once delivery: if the delete finds
    /// the job already gone (another poll won) or replaced, this returns
    /// `None`.
    pub fn poll_job(&self, server_id: &UserId) -> Result<Option<JobAssignment>, RegistryError> {
        let jobs = &self.config.jobs_collection;
        let owner = &self.config.owner;

        let Some(obj) = self.store.read(jobs, server_id.as_str(), owner)? else {
            return Ok(None);
        };
        let job: JobAssignment = decode(&obj)?;

        match self
            .store
            .delete(jobs, server_id.as_str(), owner, Some(obj.version))
        {
            Ok(true) => {
                tracing::info!(%server_id, match_id = %job.match_id, "job delivered");
                Ok(Some(job))
            }
            Ok(false) => Ok(None),
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads one lease without touching it.
    pub fn lease(&self, server_id: &UserId) -> Result<Option<ServerLease>, RegistryError> {
        self.store
            .read(&self.config.servers_collection, server_id.as_str(), &self.config.owner)?
            .map(|obj| decode(&obj))
            .transpose()
    }

    /// Reads every lease in registry order, stale ones included.
    pub fn leases(&self) -> Result<Vec<ServerLease>, RegistryError> {
        self.store
            .list(&self.config.owner, &self.config.servers_collection)?
            .iter()
            .map(decode)
            .collect()
    }

    /// Deletes a lease whose heartbeat expired, unless it was refreshed
    /// since the scan read it.
    fn reclaim_stale(
        &self,
        obj: &StorageObject,
        lease: &ServerLease,
        now: u64,
    ) -> Result<(), RegistryError> {
        match self.store.delete(
            &self.config.servers_collection,
            &obj.key,
            &self.config.owner,
            Some(obj.version),
        ) {
            Ok(_) => {
                tracing::info!(
                    server_id = %lease.server_id,
                    silent_ms = now.saturating_sub(lease.heartbeat_at),
                    "reclaimed stale server lease"
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(
                    server_id = %lease.server_id,
                    "stale lease refreshed before reclamation"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_job(&self, key: &str, job: &JobAssignment) -> Result<(), RegistryError> {
        self.store.write(
            &self.config.jobs_collection,
            key,
            &self.config.owner,
            encode(job)?,
            None,
        )?;
        Ok(())
    }

    /// Best-effort undo of a Ready→InUse claim whose job could not be
    /// written.
    fn roll_back_claim(&self, key: &str, claimed: ServerLease, version: u64) {
        let server_id = claimed.server_id.clone();
        let reverted = ServerLease {
            state: LeaseState::Ready,
            ..claimed
        };
        let result = encode(&reverted).and_then(|value| {
            self.store
                .write(
                    &self.config.servers_collection,
                    key,
                    &self.config.owner,
                    value,
                    Some(version),
                )
                .map_err(RegistryError::from)
        });
        match result {
            Ok(_) => tracing::warn!(%server_id, "job write failed, lease returned to pool"),
            Err(e) => tracing::error!(%server_id, error = %e, "job write failed and rollback failed"),
        }
    }
}

fn job_address(obj: &StorageObject) -> String {
    decode::<ServerLease>(obj)
        .map(|lease| lease.address.to_string())
        .unwrap_or_default()
}

fn decode<T: DeserializeOwned>(obj: &StorageObject) -> Result<T, RegistryError> {
    serde_json::from_value(obj.value.clone()).map_err(|source| RegistryError::Decode {
        collection: obj.collection.clone(),
        key: obj.key.clone(),
        source,
    })
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, RegistryError> {
    serde_json::to_value(value).map_err(RegistryError::Encode)
}
