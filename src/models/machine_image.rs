use std::fmt::{Display, Formatter};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};

const BUNDLED_IMAGE_TABLE: &str = include_str!("../../static/ubuntu-amis.json");

// -----------------------------------------------------------------------------
// Models
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    /// Graviton families carry a `g` in their family code (`m7g`, `c6gn`, `t4g`).
    pub fn for_instance_type(instance_type: &str) -> CloudResult<Self> {
        let family = match instance_type.split_once('.') {
            Some((family, size)) if !family.is_empty() && !size.is_empty() => family,
            _ => return Err(CloudError::InvalidInstanceType(instance_type.to_string())),
        };

        if family.contains('g') {
            Ok(Architecture::Arm64)
        } else {
            Ok(Architecture::Amd64)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MachineImage {
    pub region: String,
    pub arch: Architecture,
    pub ami_id: String,
}

/// Where the table's ids came from. `looked_up` stays empty until the ids
/// have been checked against EC2.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TableProvenance {
    pub release: String,
    pub source: Option<String>,
    pub looked_up: Option<NaiveDate>,
}

/// A table file is either a bare list of rows or a document that also
/// records its provenance.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Documented {
        #[serde(flatten)]
        provenance: TableProvenance,
        images: Vec<MachineImage>,
    },
    Bare(Vec<MachineImage>),
}

/// Static lookup table of Ubuntu AMIs per region and architecture.
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    images: Vec<MachineImage>,
    provenance: Option<TableProvenance>,
}

impl ImageCatalog {
    pub fn bundled() -> CloudResult<Self> {
        Self::from_json(BUNDLED_IMAGE_TABLE)
    }

    pub fn from_json(raw: &str) -> CloudResult<Self> {
        let table = serde_json::from_str::<TableFile>(raw)
            .map_err(|err| CloudError::ImageTable(err.to_string()))?;

        Ok(match table {
            TableFile::Documented { provenance, images } => Self {
                images,
                provenance: Some(provenance),
            },
            TableFile::Bare(images) => Self {
                images,
                provenance: None,
            },
        })
    }

    pub fn from_path(path: &Path) -> CloudResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| CloudError::ImageTable(format!("{}: {}", path.display(), err)))?;

        Self::from_json(&raw)
    }

    /// Loads the table from `path` when given, the bundled table otherwise.
    pub fn load(path: Option<&Path>) -> CloudResult<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    pub fn find(&self, region: &str, arch: Architecture) -> Option<&MachineImage> {
        self.images
            .iter()
            .find(|image| image.region == region && image.arch == arch)
    }

    /// Resolves the AMI a launch of `instance_type` in `region` would boot.
    pub fn select(&self, region: &str, instance_type: &str) -> CloudResult<&MachineImage> {
        let arch = Architecture::for_instance_type(instance_type)?;

        self.find(region, arch).ok_or_else(|| CloudError::ImageNotFound {
            region: region.to_string(),
            arch,
        })
    }

    pub fn provenance(&self) -> Option<&TableProvenance> {
        self.provenance.as_ref()
    }

    /// True when the table records the date its ids were looked up.
    pub fn is_verified(&self) -> bool {
        self.provenance
            .as_ref()
            .is_some_and(|provenance| provenance.looked_up.is_some())
    }

    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self.images.iter().map(|i| i.region.as_str()).collect();
        regions.sort_unstable();
        regions.dedup();
        regions
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_from_family() {
        let cases = [
            ("m6a.4xlarge", Architecture::Amd64),
            ("t2.nano", Architecture::Amd64),
            ("c5n.xlarge", Architecture::Amd64),
            ("m7g.large", Architecture::Arm64),
            ("c6gn.2xlarge", Architecture::Arm64),
            ("t4g.micro", Architecture::Arm64),
        ];

        for (instance_type, expected) in cases {
            assert_eq!(
                Architecture::for_instance_type(instance_type).unwrap(),
                expected,
                "{}",
                instance_type
            );
        }
    }

    #[test]
    fn test_size_suffix_does_not_affect_architecture() {
        // "large" has a `g` but only the family code counts.
        assert_eq!(
            Architecture::for_instance_type("m6i.large").unwrap(),
            Architecture::Amd64
        );
    }

    #[test]
    fn test_malformed_instance_type() {
        for bad in ["", "m6a", ".large", "m6a."] {
            assert!(matches!(
                Architecture::for_instance_type(bad),
                Err(CloudError::InvalidInstanceType(_))
            ));
        }
    }

    #[test]
    fn test_every_bundled_region_resolves_both_architectures() {
        let catalog = ImageCatalog::bundled().expect("bundled table should parse");
        assert!(!catalog.regions().is_empty());

        for region in catalog.regions() {
            let (Some(amd), Some(arm)) = (
                catalog.find(region, Architecture::Amd64),
                catalog.find(region, Architecture::Arm64),
            ) else {
                continue;
            };

            assert_eq!(catalog.select(region, "m6a.4xlarge").unwrap(), amd);
            assert_eq!(catalog.select(region, "m7g.4xlarge").unwrap(), arm);
            assert_ne!(amd.ami_id, arm.ami_id);
        }
    }

    #[test]
    fn test_unknown_region_is_not_found() {
        let catalog = ImageCatalog::bundled().unwrap();
        let err = catalog.select("mars-north-1", "m6a.4xlarge").unwrap_err();

        match err {
            CloudError::ImageNotFound { region, arch } => {
                assert_eq!(region, "mars-north-1");
                assert_eq!(arch, Architecture::Amd64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_architecture_is_not_found() {
        let catalog = ImageCatalog::from_json(
            r#"[{"region": "us-west-2", "arch": "amd64", "ami_id": "ami-0aaa"}]"#,
        )
        .unwrap();

        assert_eq!(
            catalog.select("us-west-2", "m6a.large").unwrap().ami_id,
            "ami-0aaa"
        );
        assert!(matches!(
            catalog.select("us-west-2", "m6g.large"),
            Err(CloudError::ImageNotFound { .. })
        ));
    }

    #[test]
    fn test_first_matching_row_wins() {
        let catalog = ImageCatalog::from_json(
            r#"[
                {"region": "eu-west-1", "arch": "arm64", "ami_id": "ami-first"},
                {"region": "eu-west-1", "arch": "arm64", "ami_id": "ami-second"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            catalog.select("eu-west-1", "t4g.small").unwrap().ami_id,
            "ami-first"
        );
    }

    #[test]
    fn test_load_from_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"[{"region": "ap-south-1", "arch": "arm64", "ami_id": "ami-0bbb"}]"#,
        )
        .unwrap();

        let catalog = ImageCatalog::load(Some(file.path())).unwrap();
        assert_eq!(catalog.regions(), vec!["ap-south-1"]);
    }

    #[test]
    fn test_bundled_table_records_its_release() {
        let catalog = ImageCatalog::bundled().unwrap();
        let provenance = catalog.provenance().expect("bundled table has provenance");

        assert!(provenance.release.starts_with("ubuntu-jammy-22.04"));
        assert_eq!(provenance.looked_up, None);
        assert!(!catalog.is_verified());
    }

    #[test]
    fn test_documented_table() {
        let catalog = ImageCatalog::from_json(
            r#"{
                "release": "ubuntu-noble-24.04-server",
                "source": "ssm:/aws/service/canonical/ubuntu/server/24.04/stable/current",
                "looked_up": "2024-06-01",
                "images": [{"region": "us-west-2", "arch": "amd64", "ami_id": "ami-0ccc"}]
            }"#,
        )
        .unwrap();

        assert!(catalog.is_verified());
        assert_eq!(
            catalog.provenance().unwrap().looked_up,
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(
            catalog.select("us-west-2", "m6a.large").unwrap().ami_id,
            "ami-0ccc"
        );
    }

    #[test]
    fn test_bare_table_is_unverified() {
        let catalog = ImageCatalog::from_json(
            r#"[{"region": "us-west-2", "arch": "amd64", "ami_id": "ami-0aaa"}]"#,
        )
        .unwrap();

        assert_eq!(catalog.provenance(), None);
        assert!(!catalog.is_verified());
    }

    #[test]
    fn test_invalid_table() {
        assert!(matches!(
            ImageCatalog::from_json(r#"[{"region": "us-east-1", "arch": "riscv"}]"#),
            Err(CloudError::ImageTable(_))
        ));
    }
}
