//! 性能监控单元
//!
//! 一个周期计数器加四个事件计数器。周期按每条指令一个周期近似。

pub const PMCR_E: u32 = 1 << 0;
/// 事件计数器清零
pub const PMCR_P: u32 = 1 << 1;
/// 周期计数器清零
pub const PMCR_C: u32 = 1 << 2;
/// 周期计数器 64 分频
pub const PMCR_D: u32 = 1 << 3;
pub const PMCR_N_SHIFT: u32 = 11;
const PMCR_WRITABLE: u32 = 0x3f;

pub const PMU_NUM_COUNTERS: usize = 4;
/// CNTEN/OVS 中周期计数器对应的位
pub const PMU_CYCLE_BIT: u32 = 1 << 31;

pub const PMUSERENR_EN: u32 = 1 << 0;
pub const PMUSERENR_SW: u32 = 1 << 1;
pub const PMUSERENR_CR: u32 = 1 << 2;
pub const PMUSERENR_ER: u32 = 1 << 3;

pub const EVT_SW_INCR: u32 = 0x00;
pub const EVT_INST_RETIRED: u32 = 0x08;
pub const EVT_CPU_CYCLES: u32 = 0x11;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pmu {
    pmcr: u32,
    pub cnten: u32,
    pub inten: u32,
    pub ovs: u32,
    pub selr: u32,
    pub userenr: u32,
    ccnt: u64,
    /// 不足 64 个周期的余数 (PMCR.D)
    cycle_residue: u64,
    counters: [u32; PMU_NUM_COUNTERS],
    evtyper: [u32; PMU_NUM_COUNTERS],
}

impl Pmu {
    pub fn pmcr(&self) -> u32 {
        self.pmcr | ((PMU_NUM_COUNTERS as u32) << PMCR_N_SHIFT)
    }

    pub fn set_pmcr(&mut self, v: u32) {
        if v & PMCR_C != 0 {
            self.ccnt = 0;
            self.cycle_residue = 0;
        }
        if v & PMCR_P != 0 {
            self.counters = [0; PMU_NUM_COUNTERS];
        }
        // P 与 C 只是动作，读回为 0
        self.pmcr = v & PMCR_WRITABLE & !(PMCR_P | PMCR_C);
    }

    fn enabled(&self, bit: u32) -> bool {
        self.pmcr & PMCR_E != 0 && self.cnten & bit != 0
    }

    pub fn cycle_count(&self) -> u64 {
        self.ccnt
    }

    pub fn set_cycle_count(&mut self, v: u64) {
        self.ccnt = v & 0xffff_ffff;
    }

    pub fn counter(&self, idx: usize) -> Option<u32> {
        self.counters.get(idx).copied()
    }

    pub fn set_counter(&mut self, idx: usize, v: u32) {
        if let Some(c) = self.counters.get_mut(idx) {
            *c = v;
        }
    }

    pub fn event_type(&self, idx: usize) -> Option<u32> {
        self.evtyper.get(idx).copied()
    }

    pub fn set_event_type(&mut self, idx: usize, v: u32) {
        if let Some(t) = self.evtyper.get_mut(idx) {
            *t = v & 0xff;
        }
    }

    /// 由 PMSELR 选中的事件计数器 (PMXEVCNTR)
    pub fn selected_counter(&self) -> u32 {
        self.counter(self.selr as usize).unwrap_or(0)
    }

    pub fn set_selected_counter(&mut self, v: u32) {
        self.set_counter(self.selr as usize, v);
    }

    pub fn selected_event_type(&self) -> u32 {
        self.event_type(self.selr as usize).unwrap_or(0)
    }

    pub fn set_selected_event_type(&mut self, v: u32) {
        self.set_event_type(self.selr as usize, v);
    }

    fn bump(&mut self, idx: usize, n: u32) {
        let (v, overflow) = self.counters[idx].overflowing_add(n);
        self.counters[idx] = v;
        if overflow {
            self.ovs |= 1 << idx;
        }
    }

    fn count_event(&mut self, event: u32, n: u32) {
        for idx in 0..PMU_NUM_COUNTERS {
            if self.evtyper[idx] == event && self.enabled(1 << idx) {
                self.bump(idx, n);
            }
        }
    }

    /// 记录退休指令数，同时推进周期计数
    pub fn record_instructions(&mut self, n: u64) {
        let n32 = n.min(u64::from(u32::MAX)) as u32;
        self.count_event(EVT_INST_RETIRED, n32);
        self.count_event(EVT_CPU_CYCLES, n32);
        if self.enabled(PMU_CYCLE_BIT) {
            let ticks = if self.pmcr & PMCR_D != 0 {
                let total = self.cycle_residue + n;
                self.cycle_residue = total % 64;
                total / 64
            } else {
                n
            };
            let next = self.ccnt + ticks;
            if next > 0xffff_ffff {
                self.ovs |= PMU_CYCLE_BIT;
            }
            self.ccnt = next & 0xffff_ffff;
        }
    }

    /// PMSWINC 写入
    pub fn software_increment(&mut self, mask: u32) {
        for idx in 0..PMU_NUM_COUNTERS {
            if mask & (1 << idx) != 0 && self.evtyper[idx] == EVT_SW_INCR && self.enabled(1 << idx) {
                self.bump(idx, 1);
            }
        }
    }
}
