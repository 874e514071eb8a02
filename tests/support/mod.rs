#![allow(dead_code)]

pub mod image;

pub use image::{Constant, FieldDef, ImageBuilder, Il, PropertyDef, Ty, TypeDef};

use std::path::{Path, PathBuf};

pub const PROVIDER_GUID: &str = "3f0e6c1a-8b2d-4e5f-9a7c-1d2e3f4a5b6c";

pub fn guidprobe_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_guidprobe"))
}

/// `WinCopyS3.ETWEvents` with `ProviderGuid` as `static readonly Guid` set from text
pub fn etw_events_with_field(guid: &str) -> TypeDef {
    TypeDef::class("WinCopyS3", "ETWEvents")
        .field(FieldDef::public_static("ProviderGuid", Ty::Guid))
        .static_constructor(vec![
            Il::ldstr(guid),
            Il::NewGuidFromString,
            Il::stsfld("ProviderGuid"),
            Il::Ret,
        ])
}

/// `WinCopyS3.ETWEvents` with `ProviderGuid => new Guid("...")`
pub fn etw_events_with_property(guid: &str) -> TypeDef {
    TypeDef::class("WinCopyS3", "ETWEvents").property(PropertyDef::public_static(
        "ProviderGuid",
        Ty::Guid,
        vec![Il::ldstr(guid), Il::NewGuidFromString, Il::Ret],
    ))
}

pub fn wincopys3_image(events: TypeDef) -> Vec<u8> {
    ImageBuilder::new("WinCopyS3.dll")
        .with_type(TypeDef::class("WinCopyS3", "Program"))
        .with_type(events)
        .build()
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}
