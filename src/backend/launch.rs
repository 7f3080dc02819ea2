//! Grid/block launch configuration

use super::device::DeviceProfile;
use super::stream::Stream;
use crate::error::LaunchError;
use std::fmt;

/// Three-dimensional extent of a grid or block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Dim3::new(x, 1, 1)
    }
}

impl From<(u32, u32)> for Dim3 {
    fn from((x, y): (u32, u32)) -> Self {
        Dim3::new(x, y, 1)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Dim3::new(x, y, z)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// How a kernel is launched: grid of blocks, threads per block and an
/// optional stream. Without a stream the device's default stream is used.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfiguration {
    pub grid: Dim3,
    pub block: Dim3,
    pub stream: Option<Stream>,
}

impl LaunchConfiguration {
    pub fn new(grid: impl Into<Dim3>, block: impl Into<Dim3>) -> Self {
        Self {
            grid: grid.into(),
            block: block.into(),
            stream: None,
        }
    }

    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Total emulated threads: `grid.volume() * block.volume()`, saturating
    /// at `u64::MAX`
    pub fn total_threads(&self) -> u64 {
        self.grid.volume().saturating_mul(self.block.volume())
    }

    /// Check the configuration against the device limits
    pub fn validate(&self, profile: &DeviceProfile) -> Result<(), LaunchError> {
        if self.grid.volume() == 0 || self.block.volume() == 0 {
            return Err(LaunchError::InvalidConfiguration(format!(
                "grid {} and block {} must be non-zero in every dimension",
                self.grid, self.block
            )));
        }
        if self.block.volume() > profile.max_threads_per_block as u64 {
            return Err(LaunchError::InvalidConfiguration(format!(
                "block {} has {} threads, the device allows {}",
                self.block,
                self.block.volume(),
                profile.max_threads_per_block
            )));
        }
        let limits = profile.max_grid_dims;
        if self
            .grid
            .as_array()
            .iter()
            .zip(limits.iter())
            .any(|(dim, max)| dim > max)
        {
            return Err(LaunchError::InvalidConfiguration(format!(
                "grid {} exceeds the device limit {:?}",
                self.grid, limits
            )));
        }
        if self.grid.volume().checked_mul(self.block.volume()).is_none() {
            return Err(LaunchError::InvalidConfiguration(format!(
                "grid {} with block {} launches more than {} threads",
                self.grid,
                self.block,
                u64::MAX
            )));
        }
        Ok(())
    }
}

impl From<(u32, u32)> for LaunchConfiguration {
    fn from((grid, block): (u32, u32)) -> Self {
        LaunchConfiguration::new(grid, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_single_thread_launch() {
        let launch = LaunchConfiguration::from((1, 1));
        assert_eq!(launch.total_threads(), 1);
        assert!(launch.validate(&DeviceProfile::default()).is_ok());
    }

    #[rstest]
    #[case(Dim3::new(0, 1, 1), Dim3::new(1, 1, 1))]
    #[case(Dim3::new(1, 1, 1), Dim3::new(32, 0, 1))]
    #[case(Dim3::new(1, 1, 1), Dim3::new(1024, 2, 1))]
    #[case(Dim3::new(1, 70000, 1), Dim3::new(32, 1, 1))]
    fn test_rejects_invalid(#[case] grid: Dim3, #[case] block: Dim3) {
        let launch = LaunchConfiguration::new(grid, block);
        assert!(matches!(
            launch.validate(&DeviceProfile::default()),
            Err(LaunchError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_thread_count_overflow_is_rejected() {
        let grid = Dim3::new(2_147_483_647, 65_535, 65_535);
        let launch = LaunchConfiguration::new(grid, 1024u32);
        assert_eq!(launch.total_threads(), u64::MAX);
        assert!(matches!(
            launch.validate(&DeviceProfile::default()),
            Err(LaunchError::InvalidConfiguration(_))
        ));

        let largest = LaunchConfiguration::new(grid, 1u32);
        assert!(largest.validate(&DeviceProfile::default()).is_ok());
    }

    #[test]
    fn test_dim3_conversions() {
        assert_eq!(Dim3::from(4), Dim3::new(4, 1, 1));
        assert_eq!(Dim3::from((4, 2)), Dim3::new(4, 2, 1));
        assert_eq!(Dim3::from((4, 2, 3)).volume(), 24);
    }
}
