//! DICOM network-configuration views
//!
//! Entries of the DICOM configuration schema (network connections carrying
//! `dicomHostname`/`dicomPort`, application entities named by
//! `dicomAETitle`) get dedicated read models and edit forms. Saving an edit
//! always goes through the entry mutation orchestrator.

use super::entry::{AttributeValue, Attributes, DirectoryEntry};
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

pub const CONNECTION_FILTER: &str = "(dicomPort=*)";
pub const AE_FILTER: &str = "(dicomAETitle=*)";

/// Naming attribute of every saved AE entry
pub const AE_TITLE_ATTRIBUTE: &str = "dicomAETitle";

/// Maximum length of a DICOM AE title
pub const AE_TITLE_MAX_LEN: usize = 16;

/// What a DICOM-schema entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DicomKind {
    Device,
    NetworkAe,
    NetworkConnection,
}

/// Detect DICOM entries by their object classes or characteristic attributes.
pub fn dicom_kind(entry: &DirectoryEntry) -> Option<DicomKind> {
    if entry.has_object_class("dicomNetworkAE") || entry.get("dicomAETitle").is_some() {
        Some(DicomKind::NetworkAe)
    } else if entry.has_object_class("dicomNetworkConnection") || entry.get("dicomPort").is_some() {
        Some(DicomKind::NetworkConnection)
    } else if entry.has_object_class("dicomDevice") || entry.get("dicomDeviceName").is_some() {
        Some(DicomKind::Device)
    } else {
        None
    }
}

/// A DICOM network connection as listed in the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomConnection {
    pub dn: String,
    pub cn: String,
    pub hostname: String,
    pub port: String,
}

impl DicomConnection {
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let port = entry.first("dicomPort")?;
        Some(Self {
            dn: entry.dn.clone(),
            cn: entry.first("cn").unwrap_or_default().to_string(),
            hostname: entry.first("dicomHostname").unwrap_or_default().to_string(),
            port: port.to_string(),
        })
    }
}

/// Edited fields of a DICOM network connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomConnectionEdit {
    pub cn: String,
    pub hostname: String,
    pub port: String,
}

impl DicomConnectionEdit {
    pub fn validate(&self) -> AppResult<()> {
        if self.cn.trim().is_empty() {
            return Err(AppError::Malformed("Connection name (cn) is required".to_string()));
        }
        if self.hostname.trim().is_empty() {
            return Err(AppError::Malformed("Hostname is required".to_string()));
        }
        match self.port.trim().parse::<u16>() {
            Ok(port) if port > 0 => Ok(()),
            _ => Err(AppError::Malformed(format!(
                "Port must be a number between 1 and 65535, got \"{}\"",
                self.port
            ))),
        }
    }

    /// Full attribute map for the orchestrator; `cn` drives the rename.
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("cn".to_string(), AttributeValue::One(self.cn.trim().to_string()));
        attributes.insert(
            "dicomHostname".to_string(),
            AttributeValue::One(self.hostname.trim().to_string()),
        );
        attributes.insert(
            "dicomPort".to_string(),
            AttributeValue::One(self.port.trim().to_string()),
        );
        attributes
    }
}

/// A DICOM network application entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomAe {
    pub dn: String,
    pub ae_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub connection_refs: Vec<String>,
}

impl DicomAe {
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let ae_title = entry.first("dicomAETitle")?;
        Some(Self {
            dn: entry.dn.clone(),
            ae_title: ae_title.to_string(),
            description: entry.first("dicomDescription").map(String::from),
            connection_refs: entry
                .get("dicomNetworkConnectionReference")
                .map(AttributeValue::values)
                .unwrap_or_default(),
        })
    }
}

/// Edited AE title
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomAeEdit {
    pub ae_title: String,
}

impl DicomAeEdit {
    pub fn validate(&self) -> AppResult<()> {
        let title = self.ae_title.trim();
        if title.is_empty() {
            return Err(AppError::Malformed("DICOM AE Title is required".to_string()));
        }
        if title.chars().count() > AE_TITLE_MAX_LEN {
            return Err(AppError::Malformed(format!(
                "DICOM AE Title must be at most {} characters",
                AE_TITLE_MAX_LEN
            )));
        }
        if title.chars().any(|c| c == '\\' || c.is_control()) {
            return Err(AppError::Malformed(
                "DICOM AE Title must not contain backslashes or control characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            AE_TITLE_ATTRIBUTE.to_string(),
            AttributeValue::One(self.ae_title.trim().to_string()),
        );
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_entry() -> DirectoryEntry {
        let mut attributes = Attributes::new();
        attributes.insert("cn".to_string(), "dicom".into());
        attributes.insert("dicomHostname".to_string(), "pacs.local".into());
        attributes.insert("dicomPort".to_string(), "11112".into());
        attributes.insert(
            "objectClass".to_string(),
            vec!["dicomNetworkConnection"].into(),
        );
        DirectoryEntry::new("cn=dicom,dicomDeviceName=dcm4chee-arc,cn=Devices,cn=DICOM Configuration,dc=dcm4che,dc=org", attributes)
    }

    #[test]
    fn test_connection_view() {
        let entry = connection_entry();
        assert_eq!(dicom_kind(&entry), Some(DicomKind::NetworkConnection));
        let view = DicomConnection::from_entry(&entry).unwrap();
        assert_eq!(view.cn, "dicom");
        assert_eq!(view.hostname, "pacs.local");
        assert_eq!(view.port, "11112");
    }

    #[test]
    fn test_ae_view() {
        let mut attributes = Attributes::new();
        attributes.insert("dicomAETitle".to_string(), "DCM4CHEE".into());
        attributes.insert(
            "dicomNetworkConnectionReference".to_string(),
            vec!["cn=dicom,dicomDeviceName=dcm4chee-arc"].into(),
        );
        let entry = DirectoryEntry::new("dicomAETitle=DCM4CHEE,dicomDeviceName=dcm4chee-arc", attributes);
        assert_eq!(dicom_kind(&entry), Some(DicomKind::NetworkAe));
        let view = DicomAe::from_entry(&entry).unwrap();
        assert_eq!(view.ae_title, "DCM4CHEE");
        assert_eq!(view.connection_refs.len(), 1);
        assert!(view.description.is_none());
    }

    #[test]
    fn test_connection_edit_validation() {
        let edit = DicomConnectionEdit {
            cn: "dicom".to_string(),
            hostname: "pacs.local".to_string(),
            port: "104".to_string(),
        };
        assert!(edit.validate().is_ok());

        for bad in ["0", "70000", "http", ""] {
            let edit = DicomConnectionEdit {
                port: bad.to_string(),
                ..edit.clone()
            };
            assert!(edit.validate().is_err(), "port {:?} accepted", bad);
        }
    }

    #[test]
    fn test_ae_edit_validation() {
        let ok = DicomAeEdit { ae_title: "STORESCP".to_string() };
        assert!(ok.validate().is_ok());
        let long = DicomAeEdit { ae_title: "A".repeat(17) };
        assert!(long.validate().is_err());
        let blank = DicomAeEdit { ae_title: "  ".to_string() };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_edit_attribute_maps() {
        let edit = DicomConnectionEdit {
            cn: " dicom-tls ".to_string(),
            hostname: "pacs.local".to_string(),
            port: "2762".to_string(),
        };
        let attrs = edit.to_attributes();
        assert_eq!(attrs.get("cn"), Some(&AttributeValue::One("dicom-tls".to_string())));
        assert_eq!(attrs.len(), 3);
    }
}
