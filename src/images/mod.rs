//! Shared disk images and the exclusive "master" lock.
//!
//! An [`Image`] is a backing file that several machine disks may use. Only one
//! disk at a time may use it directly; copy-on-write disks and snapshot-mode
//! machines never take the lock. The registry is owned by the factory and
//! passed explicitly to disk operations.

use crate::brick::BrickId;
use crate::errors::{BrickError, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// The disk holding an image's master slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskOwner {
    pub vm: BrickId,
    pub device: &'static str,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub path: PathBuf,
    master: Option<DiskOwner>,
    /// Registered on the fly for a bare path; not written to project files
    implicit: bool,
}

impl Image {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            master: None,
            implicit: false,
        }
    }

    pub fn holder(&self) -> Option<DiskOwner> {
        self.master
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Take the master slot. Re-acquiring by the current holder succeeds.
    pub fn acquire(&mut self, owner: DiskOwner) -> Result<()> {
        match self.master {
            Some(current) if current != owner => Err(BrickError::LockedImage(self.name.clone())),
            _ => {
                debug!("Image {} acquired by {:?}", self.name, owner);
                self.master = Some(owner);
                Ok(())
            }
        }
    }

    /// Give the master slot back.
    ///
    /// `None` stands for "no owner": releasing with it succeeds only while
    /// nothing is held. Any other mismatch is a `LockedImage` error.
    pub fn release(&mut self, owner: Option<DiskOwner>) -> Result<()> {
        if self.master != owner {
            return Err(BrickError::LockedImage(self.name.clone()));
        }
        if owner.is_some() {
            debug!("Image {} released by {:?}", self.name, owner);
        }
        self.master = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: Vec<Image>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named image; the caller is responsible for name validity
    pub fn add(&mut self, name: &str, path: impl Into<PathBuf>) -> &Image {
        let image = Image::new(name, path);
        info!("New disk image {} at {:?}", image.name, image.path);
        self.images.push(image);
        &self.images[self.images.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&Image> {
        self.images.iter().find(|i| i.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Image> {
        self.images.iter_mut().find(|i| i.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Images written to project files, in registration order
    pub fn persistent(&self) -> impl Iterator<Item = &Image> {
        self.images.iter().filter(|i| !i.is_implicit())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.iter()
    }

    /// Remove a named image; refused while a disk holds it
    pub fn remove(&mut self, name: &str) -> Result<Image> {
        let idx = self
            .images
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| BrickError::NotFound(name.to_string()))?;
        if self.images[idx].master.is_some() {
            return Err(BrickError::LockedImage(name.to_string()));
        }
        Ok(self.images.remove(idx))
    }

    /// Backing file for a disk base: a registered image name, or a path
    pub fn resolve_base(&self, base: &str) -> PathBuf {
        match self.get(base) {
            Some(image) => image.path.clone(),
            None => PathBuf::from(base),
        }
    }

    /// Lock the image backed by `path` for `owner`.
    ///
    /// Paths without a registered image get an implicit one. Returns whether
    /// the lock was newly taken (as opposed to already held by `owner`).
    /// A lock held by another disk surfaces as `DiskLocked`.
    pub fn acquire_path(&mut self, path: &Path, owner: DiskOwner) -> Result<bool> {
        let idx = match self.images.iter().position(|i| i.path == path) {
            Some(idx) => idx,
            None => {
                let mut image = Image::new(&path.display().to_string(), path);
                image.implicit = true;
                self.images.push(image);
                self.images.len() - 1
            }
        };

        let image = &mut self.images[idx];
        let newly = image.master.is_none();
        image
            .acquire(owner)
            .map_err(|_| BrickError::DiskLocked(path.to_path_buf()))?;
        Ok(newly)
    }

    /// Release `path` if `owner` holds it
    pub fn release_path(&mut self, path: &Path, owner: DiskOwner) -> Result<()> {
        match self.images.iter_mut().find(|i| i.path == path) {
            Some(image) => image.release(Some(owner)),
            None => Ok(()),
        }
    }

    /// Release every image held by machine `vm`; returns how many were freed
    pub fn release_all(&mut self, vm: BrickId) -> usize {
        let mut released = 0;
        for image in &mut self.images {
            if let Some(owner) = image.master {
                if owner.vm == vm && image.release(Some(owner)).is_ok() {
                    released += 1;
                }
            }
        }
        if released > 0 {
            info!("Released {} disk lock(s) held by brick {:?}", released, vm);
        }
        // Implicit images only exist to carry a lock
        self.images.retain(|i| !i.implicit || i.master.is_some());
        released
    }

    pub fn held_by(&self, vm: BrickId) -> Vec<&Image> {
        self.images
            .iter()
            .filter(|i| i.master.is_some_and(|o| o.vm == vm))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(vm: u64, device: &'static str) -> DiskOwner {
        DiskOwner {
            vm: BrickId(vm),
            device,
        }
    }

    #[test]
    fn test_acquire_is_exclusive() {
        let mut image = Image::new("debian", "/images/debian.img");
        image.acquire(owner(1, "hda")).unwrap();
        image.acquire(owner(1, "hda")).unwrap();
        let err = image.acquire(owner(2, "hda")).unwrap_err();
        assert!(matches!(err, BrickError::LockedImage(_)));
        assert_eq!(image.holder(), Some(owner(1, "hda")));
    }

    #[test]
    fn test_release_rules() {
        let mut image = Image::new("debian", "/images/debian.img");
        // Nothing held: only the "none" owner may release
        image.release(None).unwrap();
        assert!(image.release(Some(owner(1, "hda"))).is_err());

        image.acquire(owner(1, "hda")).unwrap();
        assert!(image.release(Some(owner(2, "hda"))).is_err());
        assert!(image.release(None).is_err());
        image.release(Some(owner(1, "hda"))).unwrap();
        assert_eq!(image.holder(), None);
        image.acquire(owner(2, "hdb")).unwrap();
    }

    #[test]
    fn test_acquire_path_reports_disk_locked() {
        let mut registry = ImageRegistry::new();
        let path = Path::new("/images/base.img");
        assert!(registry.acquire_path(path, owner(1, "hda")).unwrap());
        assert!(!registry.acquire_path(path, owner(1, "hda")).unwrap());
        let err = registry.acquire_path(path, owner(2, "hda")).unwrap_err();
        assert!(matches!(err, BrickError::DiskLocked(_)));
        assert_eq!(registry.persistent().count(), 0);
    }

    #[test]
    fn test_release_all_frees_named_and_implicit() {
        let mut registry = ImageRegistry::new();
        registry.add("debian", "/images/debian.img");
        registry
            .acquire_path(Path::new("/images/debian.img"), owner(1, "hda"))
            .unwrap();
        registry
            .acquire_path(Path::new("/tmp/scratch.img"), owner(1, "hdb"))
            .unwrap();
        assert_eq!(registry.held_by(BrickId(1)).len(), 2);

        assert_eq!(registry.release_all(BrickId(1)), 2);
        assert!(registry.held_by(BrickId(1)).is_empty());
        assert_eq!(registry.iter().count(), 1);
        assert!(registry.get("debian").unwrap().holder().is_none());
    }

    #[test]
    fn test_resolve_base_by_name_or_path() {
        let mut registry = ImageRegistry::new();
        registry.add("debian", "/images/debian.img");
        assert_eq!(registry.resolve_base("debian"), PathBuf::from("/images/debian.img"));
        assert_eq!(registry.resolve_base("/tmp/x.img"), PathBuf::from("/tmp/x.img"));
    }

    #[test]
    fn test_remove_refused_while_held() {
        let mut registry = ImageRegistry::new();
        registry.add("debian", "/images/debian.img");
        registry
            .get_mut("debian")
            .unwrap()
            .acquire(owner(1, "hda"))
            .unwrap();
        assert!(registry.remove("debian").is_err());
        registry.release_all(BrickId(1));
        assert!(registry.remove("debian").is_ok());
    }
}
