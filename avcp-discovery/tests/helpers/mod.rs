//! Test helpers for fixture-based description tests

use std::fs;
use std::path::PathBuf;

/// A captured device description with the address it was served from
#[derive(Debug, Clone)]
pub struct DescriptionFixture {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub xml_content: String,
}

impl DescriptionFixture {
    /// Load a fixture from the fixtures directory
    pub fn load(filename: &str, ip: &str, port: u16) -> Self {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("tests/fixtures");
        path.push(filename);

        let xml_content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", filename, e));

        Self {
            name: filename.to_string(),
            ip: ip.to_string(),
            port,
            xml_content,
        }
    }

    /// SSDP `LOCATION` this description would be advertised at
    pub fn location_url(&self) -> String {
        format!("http://{}:{}/description.xml", self.ip, self.port)
    }
}

pub fn minidlna_server() -> DescriptionFixture {
    DescriptionFixture::load("minidlna_server.xml", "192.168.1.20", 8200)
}

pub fn tv_renderer() -> DescriptionFixture {
    DescriptionFixture::load("tv_renderer.xml", "192.168.1.30", 7676)
}

pub fn router_gateway() -> DescriptionFixture {
    DescriptionFixture::load("router_gateway.xml", "192.168.1.1", 5000)
}

pub fn minimal_renderer() -> DescriptionFixture {
    DescriptionFixture::load("minimal_renderer.xml", "192.168.1.40", 49152)
}

/// Every fixture, AV devices and others
pub fn all_fixtures() -> Vec<DescriptionFixture> {
    vec![minidlna_server(), tv_renderer(), router_gateway(), minimal_renderer()]
}
