//! Lookup of IDCODEs to known parts.  The chain scanner only needs the instruction register
//! length of each part; everything else about a part is up to the caller's registry.
use alloc::string::String;
use alloc::vec::Vec;

/// Mask that drops the 4-bit version field of an IDCODE
pub const IDCODE_VERSION_MASK: u32 = 0x0fff_ffff;

/// A known part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceModel {
    pub idcode: u32,
    pub name: String,
    pub irlength: u16,
    /// Auxiliary TAP (CPU debug port, flash controller, ...) rather than a programming target
    pub misc: bool,
}

/// Key of a model inside the registry that resolved it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub u32);

impl DeviceModel {
    pub fn new(idcode: u32, name: impl Into<String>, irlength: u16) -> Self {
        Self {
            idcode,
            name: name.into(),
            irlength,
            misc: false,
        }
    }

    /// Same part, flagged as an auxiliary TAP
    pub fn misc(mut self) -> Self {
        self.misc = true;
        self
    }

    pub fn id(&self) -> ModelId {
        ModelId(self.idcode)
    }
}

pub trait ModelRegistry {
    /// Find the part presenting `idcode`.  `None` is a normal outcome for unknown parts.
    fn resolve(&self, idcode: u32) -> Option<&DeviceModel>;
}

/// A registry backed by a list of models.  An IDCODE matches a model exactly, or failing that,
/// on everything but the version field.
#[derive(Clone, Debug, Default)]
pub struct ModelTable {
    models: Vec<DeviceModel>,
}

impl ModelTable {
    pub fn new(models: Vec<DeviceModel>) -> Self {
        Self { models }
    }

    pub fn insert(&mut self, model: DeviceModel) {
        self.models.retain(|m| m.idcode != model.idcode);
        self.models.push(model);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl FromIterator<DeviceModel> for ModelTable {
    fn from_iter<I: IntoIterator<Item = DeviceModel>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ModelRegistry for ModelTable {
    fn resolve(&self, idcode: u32) -> Option<&DeviceModel> {
        self.models.iter().find(|m| m.idcode == idcode).or_else(|| {
            self.models
                .iter()
                .find(|m| m.idcode & IDCODE_VERSION_MASK == idcode & IDCODE_VERSION_MASK)
        })
    }
}

impl<R: ModelRegistry + ?Sized> ModelRegistry for &R {
    fn resolve(&self, idcode: u32) -> Option<&DeviceModel> {
        (**self).resolve(idcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_version_match() {
        let table: ModelTable = [
            DeviceModel::new(0x0362_d093, "xc7a35t", 6),
            DeviceModel::new(0x1362_d093, "xc7a35t rev1", 6),
            DeviceModel::new(0x4ba0_0477, "cortex-m dap", 4).misc(),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.resolve(0x1362_d093).unwrap().name, "xc7a35t rev1");
        assert_eq!(table.resolve(0x2362_d093).unwrap().name, "xc7a35t");
        assert!(table.resolve(0x4ba0_0477).unwrap().misc);
        assert!(table.resolve(0x0000_0001).is_none());
    }

    #[test]
    fn insert_replaces() {
        let mut table = ModelTable::default();
        table.insert(DeviceModel::new(1, "a", 4));
        table.insert(DeviceModel::new(1, "b", 5));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(1).unwrap().irlength, 5);
    }
}
