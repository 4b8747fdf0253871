use crate::storage::{PlayerData, ProfileFlags};
use crate::{QUESTION_COUNT, TRAIT_AXES};
use bytemuck::{Pod, Zeroable};

pub const RECORD_MAGIC: [u8; 8] = *b"TRAITREC";
pub const RECORD_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct PlayerRecord {
    pub magic: [u8; 8],
    pub version: u32,
    pub flags: u32,
    pub progress: u32,
    pub padding_1: u32, // Alignment
    pub last_active: u64,
    pub responses: [u8; QUESTION_COUNT],
    pub vector: [f32; TRAIT_AXES],
    pub checksum: u64, // crc32 of every preceding byte
}

// 8 + 16 + 8 + 112 + 120 + 8 = 272 bytes
pub const RECORD_SIZE: usize = std::mem::size_of::<PlayerRecord>();
const _: () = assert!(RECORD_SIZE == 272);

const CHECKSUM_OFFSET: usize = RECORD_SIZE - std::mem::size_of::<u64>();

impl PlayerRecord {
    pub fn from_data(data: &PlayerData) -> Self {
        let mut record = Self {
            magic: RECORD_MAGIC,
            version: RECORD_VERSION,
            flags: data.flags.bits(),
            progress: data.progress() as u32,
            padding_1: 0,
            last_active: data.last_active,
            responses: data.responses,
            vector: data.vector,
            checksum: 0,
        };
        record.checksum = record.compute_checksum();
        record
    }

    pub fn compute_checksum(&self) -> u64 {
        let bytes = bytemuck::bytes_of(self);
        crc32fast::hash(&bytes[..CHECKSUM_OFFSET]) as u64
    }

    pub fn to_data(&self) -> PlayerData {
        PlayerData {
            responses: self.responses,
            vector: self.vector,
            flags: ProfileFlags::from_bits_truncate(self.flags),
            last_active: self.last_active,
        }
    }
}
