// src/miner/work.rs
//! Work items and the shares they produce
//!
//! A [`WorkItem`] is a fixed-size value copied into every worker. The blob
//! carries a 4-byte little-endian nonce at [`NONCE_OFFSET`]; workers overwrite
//! only that field. The digest's last 8 bytes, read little-endian, are the
//! value compared against the 64-bit target.

use crate::utils::error::MinerError;
use std::fmt;

/// Capacity of the work blob in bytes
pub const MAX_BLOB_SIZE: usize = 112;

/// Byte offset of the nonce field inside the blob
pub const NONCE_OFFSET: usize = 39;

/// Smallest blob that still contains the whole nonce field
pub const MIN_WORK_SIZE: usize = NONCE_OFFSET + 4;

/// Capacity of a job identifier in bytes
pub const JOB_ID_SIZE: usize = 64;

/// Opaque, fixed-size job identifier as handed out by the pool
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct JobId([u8; JOB_ID_SIZE]);

impl JobId {
    /// Identifier with every byte zero, used by stall work
    pub const EMPTY: JobId = JobId([0u8; JOB_ID_SIZE]);

    /// Builds an identifier from raw bytes, zero-padded
    pub fn new(id: &[u8]) -> Result<Self, MinerError> {
        if id.len() > JOB_ID_SIZE {
            return Err(MinerError::InputError(format!(
                "job id is {} bytes, at most {} allowed",
                id.len(),
                JOB_ID_SIZE
            )));
        }
        let mut bytes = [0u8; JOB_ID_SIZE];
        bytes[..id.len()].copy_from_slice(id);
        Ok(JobId(bytes))
    }

    /// The identifier without its zero padding
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) => f.write_str(s),
            Err(_) => f.write_str(&hex::encode(self.as_bytes())),
        }
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self)
    }
}

/// One unit of hashing input, immutable once published
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    blob: [u8; MAX_BLOB_SIZE],
    work_size: usize,
    job_id: JobId,
    target: u64,
    pool_id: usize,
    resume_count: u32,
    nicehash: bool,
    stall: bool,
}

impl WorkItem {
    /// Creates minable work
    ///
    /// # Errors
    /// `InputError` if the blob does not fit or does not cover the nonce field.
    pub fn new(job_id: JobId, blob: &[u8], target: u64, pool_id: usize) -> Result<Self, MinerError> {
        if blob.len() < MIN_WORK_SIZE || blob.len() > MAX_BLOB_SIZE {
            return Err(MinerError::InputError(format!(
                "work blob is {} bytes, expected {}..={}",
                blob.len(),
                MIN_WORK_SIZE,
                MAX_BLOB_SIZE
            )));
        }
        let mut bytes = [0u8; MAX_BLOB_SIZE];
        bytes[..blob.len()].copy_from_slice(blob);
        Ok(WorkItem {
            blob: bytes,
            work_size: blob.len(),
            job_id,
            target,
            pool_id,
            resume_count: 0,
            nicehash: false,
            stall: false,
        })
    }

    /// Placeholder work telling workers there is nothing to mine yet
    pub fn stall() -> Self {
        WorkItem {
            blob: [0u8; MAX_BLOB_SIZE],
            work_size: 0,
            job_id: JobId::EMPTY,
            target: 0,
            pool_id: 0,
            resume_count: 0,
            nicehash: false,
            stall: true,
        }
    }

    /// Sets the resume counter used to partition the nonce space
    pub fn with_resume_count(mut self, resume_count: u32) -> Self {
        self.resume_count = resume_count;
        self
    }

    /// Marks the work as nicehash: the nonce's top byte belongs to the pool
    pub fn with_nicehash(mut self, nicehash: bool) -> Self {
        self.nicehash = nicehash;
        self
    }

    /// The meaningful part of the blob
    pub fn blob(&self) -> &[u8] {
        &self.blob[..self.work_size]
    }

    /// Blob length
    pub fn work_size(&self) -> usize {
        self.work_size
    }

    /// Offset of the nonce field within [`WorkItem::blob`]
    ///
    /// Construction guarantees `offset + 4 <= work_size` for minable work.
    pub fn nonce_field_offset(&self) -> usize {
        NONCE_OFFSET
    }

    /// The nonce currently stored in the blob
    pub fn nonce(&self) -> u32 {
        read_nonce(&self.blob, NONCE_OFFSET)
    }

    /// Job identifier
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// 64-bit share target
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Difficulty equivalent of the target
    pub fn difficulty(&self) -> u64 {
        if self.target == 0 {
            return u64::MAX;
        }
        u64::MAX / self.target
    }

    /// Pool the work came from
    pub fn pool_id(&self) -> usize {
        self.pool_id
    }

    /// Resume counter
    pub fn resume_count(&self) -> u32 {
        self.resume_count
    }

    /// Whether the nonce's high byte is reserved
    pub fn is_nicehash(&self) -> bool {
        self.nicehash
    }

    /// Whether this is placeholder work
    pub fn is_stall(&self) -> bool {
        self.stall
    }
}

/// A digest that beat the target of the work it was computed for
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Share {
    /// Job the digest belongs to, captured when it was computed
    pub job_id: JobId,
    /// Nonce that produced the digest
    pub nonce: u32,
    /// Full digest
    pub result: [u8; 32],
    /// Pool the job came from
    pub pool_id: usize,
}

/// 64-bit target for a share difficulty
pub fn target_for_difficulty(difficulty: u64) -> u64 {
    u64::MAX / difficulty.max(1)
}

/// The part of a digest compared against the target
pub fn digest_value(digest: &[u8]) -> u64 {
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[24..32]);
    u64::from_le_bytes(tail)
}

/// First nonce for a thread, spreading threads and resumes across the space
///
/// Bit reversal puts consecutive partitions as far apart as possible.
pub fn start_nonce(thread_no: usize, thread_count: usize, resume_count: u32) -> u32 {
    let slot = (thread_no as u32).wrapping_add((thread_count as u32).wrapping_mul(resume_count));
    slot.reverse_bits()
}

/// First nonce for nicehash work; keeps the pool-assigned top byte
pub fn nicehash_nonce(existing: u32, thread_no: usize, thread_count: usize, resume_count: u32) -> u32 {
    (existing & 0xFF00_0000) | (start_nonce(thread_no, thread_count, resume_count) >> 8)
}

/// Nonce used by `lane` after the shared counter advanced to `counter`
pub fn lane_nonce(counter: u32, lanes: usize, lane: usize) -> u32 {
    counter.wrapping_sub((lanes - lane - 1) as u32)
}

pub(crate) fn read_nonce(buf: &[u8], offset: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(field)
}

pub(crate) fn write_nonce(buf: &mut [u8], offset: usize, nonce: u32) {
    buf[offset..offset + 4].copy_from_slice(&nonce.to_le_bytes());
}
