use crate::volume::ScalarRange;

const TABLE_SIZE: usize = 256;

/// Grayscale ramp mapping scalar samples to 8-bit intensities.
///
/// The ramp spans `table_range` in scalar space and `value_range` in
/// brightness; brightness above 1 saturates, so an upper value of 2 reaches
/// white at the middle of the scalar range.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupTable {
    table_range: (f32, f32),
    value_range: (f32, f32),
    table: Vec<u8>,
}

impl LookupTable {
    pub fn grayscale(scalar_range: ScalarRange, value_max: f32) -> Self {
        let mut lut = Self {
            table_range: (scalar_range.min, scalar_range.max),
            value_range: (0.0, value_max),
            table: Vec::with_capacity(TABLE_SIZE),
        };
        lut.build();
        lut
    }

    pub fn table_range(&self) -> (f32, f32) {
        self.table_range
    }

    pub fn value_range(&self) -> (f32, f32) {
        self.value_range
    }

    /// Change the brightness ramp and rebuild the table
    pub fn set_value_range(&mut self, low: f32, high: f32) {
        self.value_range = (low, high);
        self.build();
    }

    fn build(&mut self) {
        let (low, high) = self.value_range;
        let step = (high - low) / (TABLE_SIZE - 1) as f32;
        self.table.clear();
        self.table.extend((0..TABLE_SIZE).map(|i| {
            let value = (low + step * i as f32).clamp(0.0, 1.0);
            (value * 255.0 + 0.5) as u8
        }));
    }

    #[inline]
    pub fn map(&self, value: f32) -> u8 {
        let (min, max) = self.table_range;
        let span = max - min;
        let index = if span > 0.0 {
            ((value - min) / span * TABLE_SIZE as f32).floor()
        } else {
            0.0
        };
        let index = (index.max(0.0) as usize).min(TABLE_SIZE - 1);
        self.table[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> ScalarRange {
        ScalarRange {
            min: 0.0,
            max: 1675.0,
        }
    }

    #[test]
    fn default_ramp_saturates_at_mid_range() {
        let lut = LookupTable::grayscale(range(), 2.0);
        assert_eq!(lut.value_range(), (0.0, 2.0));
        assert_eq!(lut.map(0.0), 0);
        assert_eq!(lut.map(1675.0), 255);
        assert_eq!(lut.map(900.0), 255);
        assert!(lut.map(400.0) < 255);
    }

    #[test]
    fn unit_ramp_is_linear() {
        let lut = LookupTable::grayscale(range(), 1.0);
        let mid = lut.map(837.5);
        assert!((126..=129).contains(&mid), "mid = {mid}");
    }

    #[test]
    fn out_of_range_samples_clamp() {
        let lut = LookupTable::grayscale(range(), 1.0);
        assert_eq!(lut.map(-50.0), 0);
        assert_eq!(lut.map(1e6), 255);
    }

    #[test]
    fn changing_value_range_rebuilds() {
        let mut lut = LookupTable::grayscale(range(), 2.0);
        let before = lut.map(400.0);
        lut.set_value_range(0.0, 0.5);
        assert!(lut.map(400.0) < before);
        assert_eq!(lut.map(1675.0), 128);
    }
}
