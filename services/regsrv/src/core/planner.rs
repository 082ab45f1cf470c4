//! Address extent and batch planning
//!
//! A device's parameters are read with as few requests as possible: each
//! register bank is covered by one contiguous extent, split into batches no
//! wider than a single read request allows.

use crate::core::types::{Parameter, RegisterCategory};

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Register Data: N × 2 bytes
/// - Total: 1 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 2) / 2 = 125.5 → 125 registers
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Inclusive address span a register bank must cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub min: u16,
    pub max: u16,
}

impl Extent {
    /// Number of addresses covered, which is also the state buffer length
    pub fn width(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// Slice window `[address - min, address + word_count - min)` for a parameter
    pub fn window(&self, param: &Parameter) -> Option<std::ops::Range<usize>> {
        if param.address < self.min || param.last_address() > u32::from(self.max) {
            return None;
        }
        let start = usize::from(param.address - self.min);
        Some(start..start + usize::from(param.word_count))
    }
}

/// One contiguous read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub start: u16,
    pub count: u16,
}

impl Batch {
    /// Last address in the batch, inclusive
    pub fn end(&self) -> u16 {
        self.start + (self.count - 1)
    }
}

/// Compute the extent of all parameters in `category`
///
/// Returns `None` when the category has no parameters; callers skip it.
pub fn compute_extent<'a, I>(params: I, category: RegisterCategory) -> Option<Extent>
where
    I: IntoIterator<Item = &'a Parameter>,
{
    params
        .into_iter()
        .filter(|p| p.category == category)
        .fold(None, |acc: Option<(u16, u32)>, p| {
            let last = p.last_address();
            Some(match acc {
                None => (p.address, last),
                Some((min, max)) => (min.min(p.address), max.max(last)),
            })
        })
        .map(|(min, max)| Extent {
            min,
            // Addresses past the 16-bit space cannot be requested anyway
            max: u16::try_from(max).unwrap_or(u16::MAX),
        })
}

/// Partition an extent into ascending, gap-free batches of at most `max_width`
///
/// `max_width` is clamped to `1..=MODBUS_MAX_READ_REGISTERS`.
pub fn make_batches(extent: Extent, max_width: u16) -> Vec<Batch> {
    let width = u32::from(max_width.clamp(1, MODBUS_MAX_READ_REGISTERS));
    let end = u32::from(extent.max);
    let mut start = u32::from(extent.min);
    let mut batches = Vec::with_capacity(extent.width().div_ceil(width as usize));

    while start <= end {
        let count = width.min(end - start + 1);
        batches.push(Batch {
            start: start as u16,
            count: count as u16,
        });
        start += count;
    }

    batches
}

/// Extent and batches for one register bank
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankPlan {
    pub extent: Option<Extent>,
    pub batches: Vec<Batch>,
}

impl BankPlan {
    pub fn for_category<'a, I>(params: I, category: RegisterCategory) -> Self
    where
        I: IntoIterator<Item = &'a Parameter>,
    {
        match compute_extent(params, category) {
            Some(extent) => Self {
                extent: Some(extent),
                batches: make_batches(extent, MODBUS_MAX_READ_REGISTERS),
            },
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DataType;

    fn assert_tiles(extent: Extent, batches: &[Batch]) {
        assert_eq!(batches.first().map(|b| b.start), Some(extent.min));
        assert_eq!(batches.last().map(|b| b.end()), Some(extent.max));
        for pair in batches.windows(2) {
            assert_eq!(pair[0].end() + 1, pair[1].start);
        }
        assert!(batches
            .iter()
            .all(|b| b.count >= 1 && b.count <= MODBUS_MAX_READ_REGISTERS));
        let total: usize = batches.iter().map(|b| usize::from(b.count)).sum();
        assert_eq!(total, extent.width());
    }

    #[test]
    fn test_batches_1_to_300() {
        let extent = Extent { min: 1, max: 300 };
        let batches = make_batches(extent, MODBUS_MAX_READ_REGISTERS);
        assert_eq!(
            batches,
            vec![
                Batch { start: 1, count: 125 },
                Batch { start: 126, count: 125 },
                Batch { start: 251, count: 50 },
            ]
        );
        assert_tiles(extent, &batches);
    }

    #[test]
    fn test_batches_tile_various_extents() {
        for (min, max) in [(1, 1), (1, 125), (1, 126), (4800, 5208), (65400, 65535)] {
            let extent = Extent { min, max };
            let batches = make_batches(extent, MODBUS_MAX_READ_REGISTERS);
            assert_tiles(extent, &batches);
        }
    }

    #[test]
    fn test_width_is_clamped() {
        let extent = Extent { min: 10, max: 20 };
        assert_eq!(make_batches(extent, 0).len(), 11);
        assert_eq!(make_batches(extent, 500).len(), 1);
    }

    #[test]
    fn test_extent_includes_multiword_tail() {
        let params = [
            Parameter::input(5001, 1, DataType::U16),
            Parameter::input(5049, 2, DataType::I32),
            Parameter::input(4800, 10, DataType::Utf8),
            Parameter::holding(1, 1, DataType::U16),
        ];
        assert_eq!(
            compute_extent(&params, RegisterCategory::Input),
            Some(Extent { min: 4800, max: 5050 })
        );
        assert_eq!(
            compute_extent(&params, RegisterCategory::Holding),
            Some(Extent { min: 1, max: 1 })
        );
    }

    #[test]
    fn test_extent_contains_every_parameter() {
        let params = [
            Parameter::holding(181, 5, DataType::Utf8),
            Parameter::holding(44, 1, DataType::U16),
            Parameter::holding(1, 1, DataType::U16),
            Parameter::holding(341, 1, DataType::U16),
        ];
        let extent = compute_extent(&params, RegisterCategory::Holding).unwrap();
        assert!(extent.min <= extent.max);
        for p in &params {
            assert!(extent.window(p).is_some());
        }
    }

    #[test]
    fn test_absent_extent() {
        let params = [Parameter::input(5001, 1, DataType::U16)];
        assert_eq!(compute_extent(&params, RegisterCategory::Holding), None);
        let plan = BankPlan::for_category(&params, RegisterCategory::Holding);
        assert!(plan.batches.is_empty());
    }

    #[test]
    fn test_window() {
        let extent = Extent { min: 4800, max: 5050 };
        let p = Parameter::input(5039, 2, DataType::U32);
        assert_eq!(extent.window(&p), Some(239..241));
        let outside = Parameter::input(5050, 2, DataType::U32);
        assert_eq!(extent.window(&outside), None);
    }
}
