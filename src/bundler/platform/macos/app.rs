//! `.app` bundles for every Apple platform.
//!
//! macOS and Mac Catalyst use the `Contents/` layout:
//!
//! ```text
//! <App>.app/Contents/Info.plist
//! <App>.app/Contents/MacOS/<exe>
//! <App>.app/Contents/Resources/<icon>
//! <App>.app/Contents/Resources/kodegen-metadata.json
//! <App>.app/Contents/Frameworks/*.dylib
//! <App>.app/Contents/embedded.provisionprofile
//! ```
//!
//! iOS, tvOS and visionOS (device and simulator) use the flat layout with
//! everything at the bundle root and `embedded.mobileprovision`.

use super::{dylib, sign};
use crate::bundler::{
    BundleRequest, BundlerContext, Result,
    embed::write_metadata_resource,
    error::ErrorExt,
    platform::{Backend, BundleStructure},
    target::Platform,
    utils::fs,
};
use crate::metadata::CargoManifest;
use std::path::{Path, PathBuf};

/// `Info.plist` keys the bundler sets; user entries for them are dropped.
pub const OWNED_PLIST_KEYS: [&str; 11] = [
    "CFBundleIdentifier",
    "CFBundleExecutable",
    "CFBundleName",
    "CFBundleShortVersionString",
    "CFBundleVersion",
    "CFBundlePackageType",
    "CFBundleInfoDictionaryVersion",
    "CFBundleIconFile",
    "CFBundleURLTypes",
    "LSApplicationCategoryType",
    "CFBundleSupportedPlatforms",
];

/// The `darwinApp` backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct DarwinAppBackend;

/// Directory shape of the bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleLayout {
    /// `Contents/MacOS`, `Contents/Resources`.
    Contents,
    /// Everything at the bundle root.
    Flat,
}

impl BundleLayout {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::MacOs | Platform::MacCatalyst => BundleLayout::Contents,
            _ => BundleLayout::Flat,
        }
    }

    fn contents(self, root: &Path) -> PathBuf {
        match self {
            BundleLayout::Contents => root.join("Contents"),
            BundleLayout::Flat => root.to_path_buf(),
        }
    }

    fn executable_dir(self, root: &Path) -> PathBuf {
        match self {
            BundleLayout::Contents => root.join("Contents/MacOS"),
            BundleLayout::Flat => root.to_path_buf(),
        }
    }

    fn resources_dir(self, root: &Path) -> PathBuf {
        match self {
            BundleLayout::Contents => root.join("Contents/Resources"),
            BundleLayout::Flat => root.to_path_buf(),
        }
    }

    fn rpath(self) -> &'static str {
        match self {
            BundleLayout::Contents => "@executable_path/../Frameworks",
            BundleLayout::Flat => "@executable_path/Frameworks",
        }
    }

    fn provisioning_profile_name(self) -> &'static str {
        match self {
            BundleLayout::Contents => "embedded.provisionprofile",
            BundleLayout::Flat => "embedded.mobileprovision",
        }
    }
}

/// Facts computed before the build.
#[derive(Clone, Debug, PartialEq)]
pub struct DarwinAppContext {
    pub layout: BundleLayout,
    /// Complete `Info.plist`.
    pub info_plist: plist::Dictionary,
    /// File name of the icon inside the resources directory.
    pub icon_file: Option<String>,
}

/// `CFBundleSupportedPlatforms` value of `platform`.
fn supported_platform(platform: Platform) -> &'static str {
    match platform {
        Platform::MacOs | Platform::MacCatalyst => "MacOSX",
        Platform::IOs => "iPhoneOS",
        Platform::IOsSimulator => "iPhoneSimulator",
        Platform::TvOs => "AppleTVOS",
        Platform::TvOsSimulator => "AppleTVSimulator",
        Platform::VisionOs => "XROS",
        Platform::VisionOsSimulator => "XRSimulator",
        Platform::Linux | Platform::Windows => "MacOSX",
    }
}

/// Converts a TOML value; datetimes become strings.
pub fn toml_to_plist(value: &toml::Value) -> plist::Value {
    match value {
        toml::Value::String(s) => plist::Value::String(s.clone()),
        toml::Value::Integer(i) => plist::Value::Integer((*i).into()),
        toml::Value::Float(f) => plist::Value::Real(*f),
        toml::Value::Boolean(b) => plist::Value::Boolean(*b),
        toml::Value::Datetime(d) => plist::Value::String(d.to_string()),
        toml::Value::Array(items) => plist::Value::Array(items.iter().map(toml_to_plist).collect()),
        toml::Value::Table(table) => plist::Value::Dictionary(
            table
                .iter()
                .map(|(key, value)| (key.clone(), toml_to_plist(value)))
                .collect(),
        ),
    }
}

/// Builds the `Info.plist` of the app in `ctx`.
pub fn info_plist(ctx: &BundlerContext, icon_file: Option<&str>) -> plist::Dictionary {
    let app = &ctx.app;
    let mut dict = plist::Dictionary::new();

    for (key, value) in &app.plist {
        if OWNED_PLIST_KEYS.contains(&key.as_str()) {
            log::warn!("Ignoring plist entry '{key}' of app '{}'; it is set by the bundler", ctx.app_name);
            continue;
        }
        dict.insert(key.clone(), toml_to_plist(value));
    }

    let string = |s: &str| plist::Value::String(s.to_string());
    let bundle_version = app
        .metadata
        .get("build_number")
        .map(|build| match build {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| app.version.clone());

    dict.insert("CFBundleIdentifier".into(), string(&app.identifier));
    dict.insert("CFBundleExecutable".into(), string(&ctx.executable_name()));
    dict.insert("CFBundleName".into(), string(&ctx.app_name));
    dict.insert("CFBundleShortVersionString".into(), string(&app.version));
    dict.insert("CFBundleVersion".into(), string(&bundle_version));
    dict.insert("CFBundlePackageType".into(), string("APPL"));
    dict.insert("CFBundleInfoDictionaryVersion".into(), string("6.0"));
    dict.insert(
        "CFBundleSupportedPlatforms".into(),
        plist::Value::Array(vec![string(supported_platform(ctx.platform()))]),
    );

    if let Some(icon) = icon_file {
        dict.insert("CFBundleIconFile".into(), string(icon));
    }
    if let Some(category) = &app.category {
        dict.insert("LSApplicationCategoryType".into(), string(category));
    }
    if !app.url_schemes.is_empty() {
        let mut url_type = plist::Dictionary::new();
        url_type.insert("CFBundleURLName".into(), string(&app.identifier));
        url_type.insert(
            "CFBundleURLSchemes".into(),
            plist::Value::Array(app.url_schemes.iter().map(|s| string(s)).collect()),
        );
        dict.insert(
            "CFBundleURLTypes".into(),
            plist::Value::Array(vec![plist::Value::Dictionary(url_type)]),
        );
    }

    dict
}

impl DarwinAppBackend {
    fn root(ctx: &BundlerContext) -> PathBuf {
        ctx.directories.output.join(format!("{}.app", ctx.app_name))
    }
}

impl Backend for DarwinAppBackend {
    type Context = DarwinAppContext;

    fn compute_context(
        &self,
        ctx: &BundlerContext,
        _request: &BundleRequest,
        _manifest: &CargoManifest,
    ) -> Result<DarwinAppContext> {
        let icon_file = ctx
            .app
            .icon
            .as_ref()
            .and_then(|icon| icon.file_name())
            .map(|name| name.to_string_lossy().into_owned());

        Ok(DarwinAppContext {
            layout: BundleLayout::for_platform(ctx.platform()),
            info_plist: info_plist(ctx, icon_file.as_deref()),
            icon_file,
        })
    }

    fn intended_output(&self, ctx: &BundlerContext, extra: &DarwinAppContext) -> BundleStructure {
        let root = Self::root(ctx);
        BundleStructure {
            executable: Some(extra.layout.executable_dir(&root).join(ctx.executable_name())),
            manifest: Some(extra.layout.contents(&root).join("Info.plist")),
            artifacts: Vec::new(),
            root,
        }
    }

    async fn bundle(&self, ctx: &BundlerContext, extra: &DarwinAppContext) -> Result<BundleStructure> {
        let structure = self.intended_output(ctx, extra);
        let root = &structure.root;
        let layout = extra.layout;
        log::info!("Creating {}", root.display());

        fs::create_dir_all(root, true).await?;

        let executable = structure
            .executable
            .clone()
            .unwrap_or_else(|| layout.executable_dir(root).join(ctx.executable_name()));
        fs::copy_file(&ctx.executable(), &executable).await?;
        fs::set_executable(&executable).await?;

        let nested = dylib::bundle_dependency_libraries(
            ctx,
            &executable,
            &layout.contents(root).join("Frameworks"),
            layout.rpath(),
        )
        .await?;

        if let (Some(icon), Some(icon_file)) = (&ctx.app.icon, &extra.icon_file) {
            fs::copy_file(
                &ctx.directories.package.join(icon),
                &layout.resources_dir(root).join(icon_file),
            )
            .await?;
        }

        write_metadata_resource(&layout.resources_dir(root), &ctx.app).await?;

        let info_plist = layout.contents(root).join("Info.plist");
        fs::create_dir_all(&layout.contents(root), false).await?;
        plist::Value::Dictionary(extra.info_plist.clone()).to_file_xml(&info_plist)?;

        if let Some(codesigning) = ctx.codesigning() {
            if let Some(profile) = &codesigning.provisioning_profile {
                let destination = layout.contents(root).join(layout.provisioning_profile_name());
                tokio::fs::copy(profile, &destination)
                    .await
                    .fs_context("embedding provisioning profile", &destination)?;
            }
            sign::sign_bundle(root, &nested, codesigning, ctx.platform()).await?;
        }

        log::info!("✓ Created {}", root.display());
        Ok(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        context::tests::context, device::Device, platform::BundlerChoice, target::Arch,
    };

    fn macos_context(root: &Path) -> BundlerContext {
        let mut ctx = context(root);
        ctx.device = Device::Host(Platform::MacOs);
        ctx.bundler = BundlerChoice::DarwinApp;
        ctx.architectures = vec![Arch::AArch64];
        ctx
    }

    fn manifest() -> CargoManifest {
        CargoManifest {
            metadata: crate::metadata::PackageMetadata {
                name: "hello".into(),
                description: "Says hello".into(),
                version: "1.2.3".into(),
                authors: vec![],
                license: None,
                homepage: None,
            },
            binaries: vec!["hello".into()],
            library: None,
        }
    }

    #[test]
    fn owned_keys_cannot_be_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = macos_context(dir.path());
        ctx.app.plist.insert("CFBundleIdentifier".into(), "com.evil".into());
        ctx.app.plist.insert("NSHighResolutionCapable".into(), true.into());
        ctx.app.url_schemes = vec!["hello".into()];
        ctx.app
            .metadata
            .insert("build_number".into(), toml::Value::Integer(42));

        let dict = info_plist(&ctx, Some("icon.icns"));
        assert_eq!(
            dict.get("CFBundleIdentifier").and_then(|v| v.as_string()),
            Some("com.example.hello")
        );
        assert_eq!(
            dict.get("NSHighResolutionCapable").and_then(|v| v.as_boolean()),
            Some(true)
        );
        assert_eq!(dict.get("CFBundleVersion").and_then(|v| v.as_string()), Some("42"));
        assert_eq!(
            dict.get("CFBundleIconFile").and_then(|v| v.as_string()),
            Some("icon.icns")
        );
        assert!(dict.contains_key("CFBundleURLTypes"));
    }

    #[test]
    fn mobile_platforms_use_the_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = macos_context(dir.path());
        ctx.device = Device::Host(Platform::IOs);
        let request = BundleRequest::new(dir.path());
        let extra = DarwinAppBackend
            .compute_context(&ctx, &request, &manifest())
            .unwrap();
        let structure = DarwinAppBackend.intended_output(&ctx, &extra);

        let root = ctx.directories.output.join("Hello.app");
        assert_eq!(structure.executable, Some(root.join("hello")));
        assert_eq!(structure.manifest, Some(root.join("Info.plist")));
    }

    #[tokio::test]
    async fn unsigned_bundle_matches_intended_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = macos_context(dir.path());
        ctx.app.icon = Some("assets/icon.icns".into());
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/icon.icns"), b"icns").unwrap();
        std::fs::create_dir_all(&ctx.directories.products).unwrap();
        std::fs::write(ctx.executable(), b"exe").unwrap();
        ctx.attach_codesigning(None).unwrap();

        let request = BundleRequest::new(dir.path());
        let extra = DarwinAppBackend
            .compute_context(&ctx, &request, &manifest())
            .unwrap();
        let intended = DarwinAppBackend.intended_output(&ctx, &extra);
        let produced = DarwinAppBackend.bundle(&ctx, &extra).await.unwrap();
        assert_eq!(intended, produced);

        let root = &produced.root;
        assert!(root.join("Contents/MacOS/hello").is_file());
        assert!(root.join("Contents/Resources/icon.icns").is_file());
        assert!(root.join("Contents/Resources/kodegen-metadata.json").is_file());

        // The Mach-O is copied untouched; metadata lives in the resources.
        let executable = produced.executable.clone().unwrap();
        assert_eq!(std::fs::read(&executable).unwrap(), b"exe");
        let metadata = crate::bundler::embed::read_embedded_metadata(&executable)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.identifier, "com.example.hello");

        let written = plist::Value::from_file(produced.manifest.unwrap()).unwrap();
        let written = written.as_dictionary().unwrap();
        assert_eq!(
            written.get("CFBundleExecutable").and_then(|v| v.as_string()),
            Some("hello")
        );
        assert_eq!(
            written.get("CFBundleSupportedPlatforms"),
            Some(&plist::Value::Array(vec!["MacOSX".into()]))
        );
    }
}
