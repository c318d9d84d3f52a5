//! Device description parsing.
//!
//! This module handles parsing UPnP device description XML and turning it
//! into the public [`Device`] type, resolving relative URLs against the
//! description's `URLBase` or, failing that, its location.

use serde::Deserialize;
use url::Url;

use crate::error::{DiscoveryError, Result};
use crate::icon::{Icon, IconFilter};
use crate::{Device, ServiceInfo};

/// UPnP device description root element.
#[derive(Debug, Deserialize)]
pub struct Root {
    #[serde(rename = "URLBase")]
    pub url_base: Option<String>,
    pub device: DeviceDescription,
}

/// Internal device description parsed from XML.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    #[serde(rename = "UDN")]
    pub udn: String,
    pub icon_list: Option<IconList>,
    pub service_list: Option<ServiceList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IconList {
    #[serde(rename = "icon", default)]
    pub icons: Vec<IconDescription>,
}

#[derive(Debug, Deserialize)]
pub struct IconDescription {
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceList {
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    pub service_type: String,
    pub service_id: String,
    #[serde(rename = "controlURL")]
    pub control_url: String,
    #[serde(rename = "eventSubURL")]
    pub event_sub_url: String,
}

impl Root {
    /// Parse a device description document.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::ParseError` if the XML is malformed or missing required fields.
    pub fn from_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))
    }

    /// Convert the description into a [`Device`].
    ///
    /// # Arguments
    ///
    /// * `location` - URL the description was fetched from
    /// * `icon_filter` - policy choosing the device's icon
    /// * `pinned` - whether the device was added by fixed location
    pub fn into_device(self, location: &str, icon_filter: &dyn IconFilter, pinned: bool) -> Result<Device> {
        let base = self.base_url(location)?;
        let description = self.device;

        let icons: Vec<Icon> = description
            .icon_list
            .unwrap_or_default()
            .icons
            .into_iter()
            .filter_map(|icon| {
                Some(Icon {
                    url: resolve(&base, &icon.url)?,
                    mime_type: icon.mimetype,
                    width: icon.width,
                    height: icon.height,
                    depth: icon.depth,
                })
            })
            .collect();

        let services = description
            .service_list
            .unwrap_or_default()
            .services
            .into_iter()
            .filter_map(|service| {
                Some(ServiceInfo {
                    control_url: resolve(&base, &service.control_url)?,
                    event_sub_url: resolve(&base, &service.event_sub_url)?,
                    service_type: service.service_type,
                    service_id: service.service_id,
                })
            })
            .collect();

        Ok(Device {
            udn: description.udn.trim().to_string(),
            device_type: description.device_type.trim().to_string(),
            friendly_name: description.friendly_name,
            manufacturer: description.manufacturer.unwrap_or_default(),
            model_name: description.model_name.unwrap_or_default(),
            location: location.to_string(),
            icon: icon_filter.select(&icons).cloned(),
            services,
            pinned,
        })
    }

    fn base_url(&self, location: &str) -> Result<Url> {
        let base = self
            .url_base
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .unwrap_or(location);

        Url::parse(base)
            .map_err(|e| DiscoveryError::ParseError(format!("Invalid base URL {}: {}", base, e)))
    }
}

fn resolve(base: &Url, relative: &str) -> Option<String> {
    base.join(relative.trim()).ok().map(String::from)
}

/// Extract the host from a URL, e.g. `"http://192.168.1.100:8200/desc.xml"` -> `"192.168.1.100"`.
pub fn extract_host_from_url(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::{NoIconFilter, PreferredIconFilter};

    const MEDIA_SERVER_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>NAS Music</friendlyName>
    <manufacturer>Justin Maggard</manufacturer>
    <modelName>Windows Media Connect compatible (MiniDLNA)</modelName>
    <UDN>uuid:4d696e69-444c-164e-9d41-b827eb1c4d1e</UDN>
    <iconList>
      <icon><mimetype>image/png</mimetype><width>48</width><height>48</height><depth>24</depth><url>/icons/sm.png</url></icon>
      <icon><mimetype>image/png</mimetype><width>120</width><height>120</height><depth>24</depth><url>/icons/lrg.png</url></icon>
      <icon><mimetype>image/jpeg</mimetype><width>48</width><height>48</height><depth>24</depth><url>/icons/sm.jpg</url></icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>/ContentDir.xml</SCPDURL>
        <controlURL>/ctl/ContentDir</controlURL>
        <eventSubURL>/evt/ContentDir</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <SCPDURL>/ConnectionMgr.xml</SCPDURL>
        <controlURL>/ctl/ConnectionMgr</controlURL>
        <eventSubURL>/evt/ConnectionMgr</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_media_server_from_xml() {
        let root = Root::from_xml(MEDIA_SERVER_XML).unwrap();
        let device = root
            .into_device("http://192.168.1.20:8200/rootDesc.xml", &PreferredIconFilter, false)
            .unwrap();

        assert_eq!(device.udn, "uuid:4d696e69-444c-164e-9d41-b827eb1c4d1e");
        assert_eq!(device.friendly_name, "NAS Music");
        assert_eq!(device.manufacturer, "Justin Maggard");
        assert_eq!(device.location, "http://192.168.1.20:8200/rootDesc.xml");
        assert!(!device.pinned);

        let icon = device.icon.unwrap();
        assert_eq!(icon.url, "http://192.168.1.20:8200/icons/lrg.png");

        assert_eq!(device.services.len(), 2);
        assert_eq!(
            device.services[0].event_sub_url,
            "http://192.168.1.20:8200/evt/ContentDir"
        );
        assert_eq!(
            device.services[0].control_url,
            "http://192.168.1.20:8200/ctl/ContentDir"
        );
    }

    #[test]
    fn test_url_base_takes_precedence() {
        let xml = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <URLBase>http://10.0.0.9:49152/</URLBase>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Kitchen TV</friendlyName>
    <UDN>uuid:tv-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <controlURL>upnp/control/avt</controlURL>
        <eventSubURL>upnp/event/avt</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

        let device = Root::from_xml(xml)
            .unwrap()
            .into_device("http://10.0.0.9:8080/description.xml", &PreferredIconFilter, true)
            .unwrap();

        assert_eq!(device.services[0].event_sub_url, "http://10.0.0.9:49152/upnp/event/avt");
        assert_eq!(device.manufacturer, "");
        assert!(device.icon.is_none());
        assert!(device.pinned);
    }

    #[test]
    fn test_icon_filter_is_applied() {
        let device = Root::from_xml(MEDIA_SERVER_XML)
            .unwrap()
            .into_device("http://192.168.1.20:8200/rootDesc.xml", &NoIconFilter, false)
            .unwrap();

        assert!(device.icon.is_none());
    }

    #[test]
    fn test_missing_udn_is_parse_error() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
            <friendlyName>No UDN</friendlyName>
        </device></root>"#;

        assert!(matches!(Root::from_xml(xml), Err(DiscoveryError::ParseError(_))));
    }

    #[test]
    fn test_invalid_location_is_parse_error() {
        let result = Root::from_xml(MEDIA_SERVER_XML)
            .unwrap()
            .into_device("not a url", &PreferredIconFilter, false);

        assert!(matches!(result, Err(DiscoveryError::ParseError(_))));
    }

    #[test]
    fn test_extract_host_from_url() {
        assert_eq!(
            extract_host_from_url("http://192.168.1.100:1400/xml/device_description.xml"),
            Some("192.168.1.100".to_string())
        );
        assert_eq!(extract_host_from_url("invalid-url"), None);
    }
}
