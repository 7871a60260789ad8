//! Virtual machine disks and copy-on-write overlays.

use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Drive slots a virtual machine can populate, in command-line order
pub const DISK_DEVICES: [&str; 7] = ["hda", "hdb", "hdc", "hdd", "fda", "fdb", "mtdblock"];

/// A disk slot owned by one virtual machine.
///
/// `base` is either a registered image name or a file path; it is refreshed
/// from the `base<device>` parameter every time the machine's command line is
/// synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    pub device: String,
    pub base: String,
    pub cow: bool,
}

impl Disk {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            base: String::new(),
            cow: false,
        }
    }

    /// Private overlay file for this disk of machine `vm_name`
    pub fn overlay_path(&self, vm_name: &str, basefolder: &Path) -> PathBuf {
        basefolder.join(format!("{}_{}.cow", vm_name, self.device))
    }

    /// Return the overlay path, creating the overlay on first use.
    ///
    /// An existing overlay is reused untouched, so writes already recorded
    /// in it survive restarts.
    pub fn ensure_overlay(
        &self,
        vm_name: &str,
        basefolder: &Path,
        base_path: &Path,
        qemu_img: &str,
    ) -> io::Result<PathBuf> {
        let overlay = self.overlay_path(vm_name, basefolder);
        if overlay.exists() {
            debug!("Reusing overlay {:?}", overlay);
            return Ok(overlay);
        }

        std::fs::create_dir_all(basefolder)?;
        info!("Creating overlay {:?} on top of {:?}", overlay, base_path);
        let status = Command::new(qemu_img)
            .arg("create")
            .arg("-f")
            .arg("qcow2")
            .arg("-b")
            .arg(base_path)
            .arg(&overlay)
            .status()?;

        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} exited with {} creating {:?}", qemu_img, status, overlay),
            ));
        }
        Ok(overlay)
    }

    /// `-<device> <path>` argument pair
    pub fn args(&self, real_path: &Path) -> [String; 2] {
        [
            format!("-{}", self.device),
            real_path.display().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_path_and_args() {
        let disk = Disk::new("hdb");
        let overlay = disk.overlay_path("vm1", Path::new("/var/images"));
        assert_eq!(overlay, PathBuf::from("/var/images/vm1_hdb.cow"));
        assert_eq!(
            disk.args(&overlay),
            ["-hdb".to_string(), "/var/images/vm1_hdb.cow".to_string()]
        );
    }

    #[test]
    fn test_existing_overlay_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Disk::new("hda");
        let overlay = disk.overlay_path("vm1", dir.path());
        std::fs::write(&overlay, b"cow").unwrap();

        // The tool is never run when the overlay is already there
        let got = disk
            .ensure_overlay("vm1", dir.path(), Path::new("/base.img"), "/nonexistent/qemu-img")
            .unwrap();
        assert_eq!(got, overlay);
    }
}
