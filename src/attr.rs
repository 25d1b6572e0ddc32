//! `perf_event_attr` parsing and emission, including the flag bitfield.

use std::io::{self, Read, Write};

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Error, Result};

bitflags! {
    /// Specifies which values are included in a sample. (`sample_type`)
    pub struct SampleFormat: u64 {
        const IP = PERF_SAMPLE_IP;
        const TID = PERF_SAMPLE_TID;
        const TIME = PERF_SAMPLE_TIME;
        const ADDR = PERF_SAMPLE_ADDR;
        const READ = PERF_SAMPLE_READ;
        const CALLCHAIN = PERF_SAMPLE_CALLCHAIN;
        const ID = PERF_SAMPLE_ID;
        const CPU = PERF_SAMPLE_CPU;
        const PERIOD = PERF_SAMPLE_PERIOD;
        const STREAM_ID = PERF_SAMPLE_STREAM_ID;
        const RAW = PERF_SAMPLE_RAW;
        const BRANCH_STACK = PERF_SAMPLE_BRANCH_STACK;
        const REGS_USER = PERF_SAMPLE_REGS_USER;
        const STACK_USER = PERF_SAMPLE_STACK_USER;
        const WEIGHT = PERF_SAMPLE_WEIGHT;
        const DATA_SRC = PERF_SAMPLE_DATA_SRC;
        const IDENTIFIER = PERF_SAMPLE_IDENTIFIER;
        const TRANSACTION = PERF_SAMPLE_TRANSACTION;
        const REGS_INTR = PERF_SAMPLE_REGS_INTR;
        const PHYS_ADDR = PERF_SAMPLE_PHYS_ADDR;
        const AUX = PERF_SAMPLE_AUX;
        const CGROUP = PERF_SAMPLE_CGROUP;
        const DATA_PAGE_SIZE = PERF_SAMPLE_DATA_PAGE_SIZE;
        const CODE_PAGE_SIZE = PERF_SAMPLE_CODE_PAGE_SIZE;
        const WEIGHT_STRUCT = PERF_SAMPLE_WEIGHT_STRUCT;
    }

    /// Branch-sample specific flags. (`branch_sample_type`)
    pub struct BranchSampleFormat: u64 {
        const USER = PERF_SAMPLE_BRANCH_USER;
        const KERNEL = PERF_SAMPLE_BRANCH_KERNEL;
        const HV = PERF_SAMPLE_BRANCH_HV;
        const ANY = PERF_SAMPLE_BRANCH_ANY;
        const ANY_CALL = PERF_SAMPLE_BRANCH_ANY_CALL;
        const ANY_RETURN = PERF_SAMPLE_BRANCH_ANY_RETURN;
        const IND_CALL = PERF_SAMPLE_BRANCH_IND_CALL;
        const ABORT_TX = PERF_SAMPLE_BRANCH_ABORT_TX;
        const IN_TX = PERF_SAMPLE_BRANCH_IN_TX;
        const NO_TX = PERF_SAMPLE_BRANCH_NO_TX;
        const COND = PERF_SAMPLE_BRANCH_COND;
        const CALL_STACK = PERF_SAMPLE_BRANCH_CALL_STACK;
        const IND_JUMP = PERF_SAMPLE_BRANCH_IND_JUMP;
        const CALL = PERF_SAMPLE_BRANCH_CALL;
        const NO_FLAGS = PERF_SAMPLE_BRANCH_NO_FLAGS;
        const NO_CYCLES = PERF_SAMPLE_BRANCH_NO_CYCLES;
        const TYPE_SAVE = PERF_SAMPLE_BRANCH_TYPE_SAVE;
        const HW_INDEX = PERF_SAMPLE_BRANCH_HW_INDEX;
    }

    /// The boolean configuration bits of `perf_event_attr`.
    pub struct AttrFlags: u64 {
        /// off by default
        const DISABLED = ATTR_FLAG_BIT_DISABLED;
        /// children inherit it
        const INHERIT = ATTR_FLAG_BIT_INHERIT;
        /// must always be on PMU
        const PINNED = ATTR_FLAG_BIT_PINNED;
        /// only group on PMU
        const EXCLUSIVE = ATTR_FLAG_BIT_EXCLUSIVE;
        /// don't count user
        const EXCLUDE_USER = ATTR_FLAG_BIT_EXCLUDE_USER;
        /// don't count kernel
        const EXCLUDE_KERNEL = ATTR_FLAG_BIT_EXCLUDE_KERNEL;
        /// don't count hypervisor
        const EXCLUDE_HV = ATTR_FLAG_BIT_EXCLUDE_HV;
        /// don't count when idle
        const EXCLUDE_IDLE = ATTR_FLAG_BIT_EXCLUDE_IDLE;
        /// include mmap data
        const MMAP = ATTR_FLAG_BIT_MMAP;
        /// include comm data
        const COMM = ATTR_FLAG_BIT_COMM;
        /// use freq, not period
        const FREQ = ATTR_FLAG_BIT_FREQ;
        /// per task counts
        const INHERIT_STAT = ATTR_FLAG_BIT_INHERIT_STAT;
        /// next exec enables
        const ENABLE_ON_EXEC = ATTR_FLAG_BIT_ENABLE_ON_EXEC;
        /// trace fork/exit
        const TASK = ATTR_FLAG_BIT_TASK;
        /// wakeup_watermark
        const WATERMARK = ATTR_FLAG_BIT_WATERMARK;
        /// the two-bit skid constraint field
        const PRECISE_IP_BITMASK = ATTR_FLAG_BITMASK_PRECISE_IP;
        /// non-exec mmap data
        const MMAP_DATA = ATTR_FLAG_BIT_MMAP_DATA;
        /// sample_type all events
        const SAMPLE_ID_ALL = ATTR_FLAG_BIT_SAMPLE_ID_ALL;
        /// don't count in host
        const EXCLUDE_HOST = ATTR_FLAG_BIT_EXCLUDE_HOST;
        /// don't count in guest
        const EXCLUDE_GUEST = ATTR_FLAG_BIT_EXCLUDE_GUEST;
        /// exclude kernel callchains
        const EXCLUDE_CALLCHAIN_KERNEL = ATTR_FLAG_BIT_EXCLUDE_CALLCHAIN_KERNEL;
        /// exclude user callchains
        const EXCLUDE_CALLCHAIN_USER = ATTR_FLAG_BIT_EXCLUDE_CALLCHAIN_USER;
        /// include mmap with inode data
        const MMAP2 = ATTR_FLAG_BIT_MMAP2;
        /// flag comm events that are due to exec
        const COMM_EXEC = ATTR_FLAG_BIT_COMM_EXEC;
        /// use @clockid for time fields
        const USE_CLOCKID = ATTR_FLAG_BIT_USE_CLOCKID;
        /// context switch data
        const CONTEXT_SWITCH = ATTR_FLAG_BIT_CONTEXT_SWITCH;
        /// write ring buffer from end to beginning
        const WRITE_BACKWARD = ATTR_FLAG_BIT_WRITE_BACKWARD;
        /// include namespaces data
        const NAMESPACES = ATTR_FLAG_BIT_NAMESPACES;
        /// include ksymbol events
        const KSYMBOL = ATTR_FLAG_BIT_KSYMBOL;
        /// include bpf events
        const BPF_EVENT = ATTR_FLAG_BIT_BPF_EVENT;
        /// generate AUX records instead of events
        const AUX_OUTPUT = ATTR_FLAG_BIT_AUX_OUTPUT;
        /// include cgroup events
        const CGROUP = ATTR_FLAG_BIT_CGROUP;
        /// include text poke events
        const TEXT_POKE = ATTR_FLAG_BIT_TEXT_POKE;
        /// use build id in mmap2 events
        const BUILD_ID = ATTR_FLAG_BIT_BUILD_ID;
        /// children only inherit if cloned with CLONE_THREAD
        const INHERIT_THREAD = ATTR_FLAG_BIT_INHERIT_THREAD;
        /// event is removed from task on exec
        const REMOVE_ON_EXEC = ATTR_FLAG_BIT_REMOVE_ON_EXEC;
        /// send synchronous SIGTRAP on event
        const SIGTRAP = ATTR_FLAG_BIT_SIGTRAP;
    }

    /// The format of counter values read for a sample, per `read_format`.
    pub struct ReadFormat: u64 {
        const TOTAL_TIME_ENABLED = PERF_FORMAT_TOTAL_TIME_ENABLED;
        const TOTAL_TIME_RUNNING = PERF_FORMAT_TOTAL_TIME_RUNNING;
        const ID = PERF_FORMAT_ID;
        const GROUP = PERF_FORMAT_GROUP;
    }
}

macro_rules! serde_as_bits {
    ($ty:ident) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_u64(self.bits())
            }
        }
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                Ok($ty::from_bits_truncate(u64::deserialize(deserializer)?))
            }
        }
    };
}

serde_as_bits!(SampleFormat);
serde_as_bits!(BranchSampleFormat);
serde_as_bits!(AttrFlags);
serde_as_bits!(ReadFormat);

/// How precise the sampled instruction address is requested to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IpSkidConstraint {
    /// 0 - SAMPLE_IP can have arbitrary skid
    ArbitrarySkid,
    /// 1 - SAMPLE_IP must have constant skid
    ConstantSkid,
    /// 2 - SAMPLE_IP requested to have 0 skid
    ZeroSkid,
    /// 3 - SAMPLE_IP must have 0 skid, or uses randomization to avoid
    /// sample shadowing effects
    ZeroSkidOrRandomization,
}

impl AttrFlags {
    pub fn ip_skid_constraint(&self) -> IpSkidConstraint {
        match (self.bits() & Self::PRECISE_IP_BITMASK.bits()) >> 15 {
            0 => IpSkidConstraint::ArbitrarySkid,
            1 => IpSkidConstraint::ConstantSkid,
            2 => IpSkidConstraint::ZeroSkid,
            3 => IpSkidConstraint::ZeroSkidOrRandomization,
            _ => unreachable!(),
        }
    }
}

/// `perf_event_attr`: the configuration of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfEventAttr {
    /// Major type: hardware/software/tracepoint/etc.
    pub type_: u32,
    /// Size of the attr structure as declared by the producer.
    pub size: u32,
    /// Type-specific configuration information.
    pub config: u64,
    /// Sample frequency if `AttrFlags::FREQ` is set, otherwise the sample period.
    pub sampling_period_or_frequency: u64,
    pub sample_format: SampleFormat,
    pub read_format: ReadFormat,
    pub flags: AttrFlags,
    /// Watermark if `AttrFlags::WATERMARK` is set, otherwise a wakeup event count.
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    /// `bp_addr` / `kprobe_func` / `uprobe_path` / `config1`.
    pub config1: u64,
    /// `bp_len` / `kprobe_addr` / `probe_offset` / `config2`.
    pub config2: u64,
    pub branch_sample_format: BranchSampleFormat,
    /// Set of user regs to dump on samples.
    pub sample_regs_user: u64,
    /// Size of the user stack to dump on samples.
    pub sample_stack_user: u32,
    pub clockid: u32,
    pub sample_regs_intr: u64,
    /// Wakeup watermark for the AUX area.
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub aux_sample_size: u32,
    pub sig_data: u64,
}

impl PerfEventAttr {
    /// Parses one attr. `size_override` comes from the file header's
    /// `attr_size` when set; otherwise the attr's own declared size is used.
    ///
    /// The producer's attr may be shorter or longer than the current form:
    /// fields past the declared size stay zero, and producer-only bytes past
    /// the current form are skipped. `swap_flag_bitfield` must be set for
    /// big-endian input, where the flag word's bitfield layout was allocated
    /// MSB-first by the producer's ABI.
    pub fn parse<R: Read, T: ByteOrder>(
        reader: &mut R,
        size_override: Option<u32>,
        swap_flag_bitfield: bool,
    ) -> Result<Self> {
        let type_ = reader.read_u32::<T>()?;
        let self_described_size = reader.read_u32::<T>()?;

        let size = size_override.unwrap_or(self_described_size);
        if size < PERF_ATTR_SIZE_VER0 {
            return Err(Error::format(format!(
                "perf_event_attr size {size} is below the minimum of {PERF_ATTR_SIZE_VER0}"
            )));
        }

        let config = reader.read_u64::<T>()?;
        let sampling_period_or_frequency = reader.read_u64::<T>()?;
        let sample_type = reader.read_u64::<T>()?;
        let read_format = reader.read_u64::<T>()?;

        let mut flag_bytes = [0u8; 8];
        reader.read_exact(&mut flag_bytes)?;
        let flags = if swap_flag_bitfield {
            recover_flag_bitfield(flag_bytes)
        } else {
            u64::from_le_bytes(flag_bytes)
        };

        let wakeup_events_or_watermark = reader.read_u32::<T>()?;
        let bp_type = reader.read_u32::<T>()?;
        let config1 = reader.read_u64::<T>()?;

        let config2 = if size >= PERF_ATTR_SIZE_VER1 {
            reader.read_u64::<T>()?
        } else {
            0
        };

        let branch_sample_type = if size >= PERF_ATTR_SIZE_VER2 {
            reader.read_u64::<T>()?
        } else {
            0
        };

        let (sample_regs_user, sample_stack_user, clockid) = if size >= PERF_ATTR_SIZE_VER3 {
            (
                reader.read_u64::<T>()?,
                reader.read_u32::<T>()?,
                reader.read_u32::<T>()?,
            )
        } else {
            (0, 0, 0)
        };

        let sample_regs_intr = if size >= PERF_ATTR_SIZE_VER4 {
            reader.read_u64::<T>()?
        } else {
            0
        };

        let (aux_watermark, sample_max_stack) = if size >= PERF_ATTR_SIZE_VER5 {
            let aux_watermark = reader.read_u32::<T>()?;
            let sample_max_stack = reader.read_u16::<T>()?;
            let _reserved = reader.read_u16::<T>()?;
            (aux_watermark, sample_max_stack)
        } else {
            (0, 0)
        };

        let aux_sample_size = if size >= PERF_ATTR_SIZE_VER6 {
            let aux_sample_size = reader.read_u32::<T>()?;
            let _reserved = reader.read_u32::<T>()?;
            aux_sample_size
        } else {
            0
        };

        let sig_data = if size >= PERF_ATTR_SIZE_VER7 {
            reader.read_u64::<T>()?
        } else {
            0
        };

        // Skip any producer-only bytes past the current form.
        if size > PERF_ATTR_SIZE_VER7 {
            let remaining = size - PERF_ATTR_SIZE_VER7;
            io::copy(&mut reader.by_ref().take(remaining.into()), &mut io::sink())?;
        }

        Ok(Self {
            type_,
            size: PERF_ATTR_SIZE_VER7,
            config,
            sampling_period_or_frequency,
            sample_format: SampleFormat::from_bits_truncate(sample_type),
            read_format: ReadFormat::from_bits_truncate(read_format),
            flags: AttrFlags::from_bits_truncate(flags),
            wakeup_events_or_watermark,
            bp_type,
            config1,
            config2,
            branch_sample_format: BranchSampleFormat::from_bits_truncate(branch_sample_type),
            sample_regs_user,
            sample_stack_user,
            clockid,
            sample_regs_intr,
            aux_watermark,
            sample_max_stack,
            aux_sample_size,
            sig_data,
        })
    }

    /// Emits the attr in the current (VER7) form, little-endian.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.type_)?;
        writer.write_u32::<LittleEndian>(PERF_ATTR_SIZE_VER7)?;
        writer.write_u64::<LittleEndian>(self.config)?;
        writer.write_u64::<LittleEndian>(self.sampling_period_or_frequency)?;
        writer.write_u64::<LittleEndian>(self.sample_format.bits())?;
        writer.write_u64::<LittleEndian>(self.read_format.bits())?;
        writer.write_u64::<LittleEndian>(self.flags.bits())?;
        writer.write_u32::<LittleEndian>(self.wakeup_events_or_watermark)?;
        writer.write_u32::<LittleEndian>(self.bp_type)?;
        writer.write_u64::<LittleEndian>(self.config1)?;
        writer.write_u64::<LittleEndian>(self.config2)?;
        writer.write_u64::<LittleEndian>(self.branch_sample_format.bits())?;
        writer.write_u64::<LittleEndian>(self.sample_regs_user)?;
        writer.write_u32::<LittleEndian>(self.sample_stack_user)?;
        writer.write_u32::<LittleEndian>(self.clockid)?;
        writer.write_u64::<LittleEndian>(self.sample_regs_intr)?;
        writer.write_u32::<LittleEndian>(self.aux_watermark)?;
        writer.write_u16::<LittleEndian>(self.sample_max_stack)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u32::<LittleEndian>(self.aux_sample_size)?;
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u64::<LittleEndian>(self.sig_data)?;
        Ok(())
    }

    pub fn sample_id_all(&self) -> bool {
        self.flags.contains(AttrFlags::SAMPLE_ID_ALL)
    }

    pub fn exclude_kernel(&self) -> bool {
        self.flags.contains(AttrFlags::EXCLUDE_KERNEL)
    }
}

/// One attribute together with the unique event IDs that select it, and the
/// event name if one was recorded (event-type section or EVENT_DESC metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerfFileAttr {
    pub attr: PerfEventAttr,
    pub ids: Vec<u64>,
    pub name: Option<String>,
}

impl Default for PerfEventAttr {
    fn default() -> Self {
        Self {
            type_: 0,
            size: PERF_ATTR_SIZE_VER7,
            config: 0,
            sampling_period_or_frequency: 0,
            sample_format: SampleFormat::empty(),
            read_format: ReadFormat::empty(),
            flags: AttrFlags::empty(),
            wakeup_events_or_watermark: 0,
            bp_type: 0,
            config1: 0,
            config2: 0,
            branch_sample_format: BranchSampleFormat::empty(),
            sample_regs_user: 0,
            sample_stack_user: 0,
            clockid: 0,
            sample_regs_intr: 0,
            aux_watermark: 0,
            sample_max_stack: 0,
            aux_sample_size: 0,
            sig_data: 0,
        }
    }
}

/// Recovers the flag word of an attr produced on a big-endian ABI.
///
/// Big-endian compilers allocate bitfields starting from the most significant
/// bit of the storage unit, so the recovery is a whole-word bit reversal:
/// reverse the bits of each stored byte, then assemble the bytes in reverse
/// significance order. The two-bit `precise_ip` field comes out with its own
/// bits reversed as if it were two flags, so those two bits are swapped back.
fn recover_flag_bitfield(stored: [u8; 8]) -> u64 {
    let mut bytes = stored;
    for b in bytes.iter_mut() {
        *b = b.reverse_bits();
    }
    let raw = u64::from_le_bytes(bytes);

    let precise_ip = (raw & ATTR_FLAG_BITMASK_PRECISE_IP) >> 15;
    let fixed_precise_ip = (precise_ip & 0x2) >> 1 | (precise_ip & 0x1) << 1;
    (raw & !ATTR_FLAG_BITMASK_PRECISE_IP) | (fixed_precise_ip << 15)
}
