//! Toolchain for the `arm64-nx64` console platform.
//!
//! Compilers are the SDK's bundled clang/LLVM; packaging uses the SDK's
//! MakeNso, MakeMeta and AuthoringTool command line tools.

use std::path::Path;

use crate::core::{BuildTarget, FlagKind, FlagSet, TargetKind};

use super::{
    sdk_path, OutputPatterns, PlatformToolchain, SupportFiles, ToolRole, ToolchainConfig,
};

/// SDK build target directory name used in library and include paths.
const SDK_BUILD_TARGET: &str = "NX-NXFP2-a64";

const COMPILER_BIN: &str = "Compilers/NX/nx/aarch64/bin";
const COMMAND_LINE_TOOLS: &str = "Tools/CommandLineTools";
const SPEC_FILES: &str = "Resources/SpecFiles";

const CCFLAGS: &str = "-mcpu=cortex-a57+fp+simd+crypto+crc -fno-common -fno-short-enums \
    -ffunction-sections -fdata-sections -fPIC -fdiagnostics-format=msvc";

const CXXFLAGS: &str = "-fno-rtti -std=gnu++14";

const LINKFLAGS: &str = "-nostartfiles -Wl,--gc-sections -Wl,--build-id=sha1 -Wl,-init=_init \
    -Wl,-fini=_fini -Wl,-pie -Wl,-z,combreloc -Wl,-z,relro -Wl,--enable-new-dtags \
    -Wl,-u,malloc -Wl,-u,calloc -Wl,-u,realloc -Wl,-u,aligned_alloc -Wl,-u,free \
    -fdiagnostics-format=msvc";

/// Startup objects and SDK archives linked into every program, grouped.
const LINK_GROUP: &[&str] = &[
    "rocrt.o",
    "nnApplication.o",
    "libnn_init_memory.a",
    "libnn_gll.a",
    "libnn_gfx.a",
    "libnn_mii_draw.a",
];

const DEFINE_PREFIX: &str = "NN_SDK_BUILD_";

/// Flag the generic program link rules add and this linker rejects.
const AUTO_IMPORT_FLAG: &str = "-Wl,--enable-auto-import";

/// Define that turns off colored output in the test harness.
const TEST_NO_COLORS: &str = "JC_TEST_NO_COLORS";

#[derive(Debug, Clone, Copy, Default)]
pub struct Nx64Toolchain;

impl Nx64Toolchain {
    fn develop_lib(sdk_root: &Path, file: &str) -> String {
        sdk_path(
            sdk_root,
            &format!("Libraries/{}/Develop/{}", SDK_BUILD_TARGET, file),
        )
        .display()
        .to_string()
    }

    fn link_flags(sdk_root: &Path) -> String {
        let ldscript = sdk_path(
            sdk_root,
            &format!("{}/Application.aarch64.lp64.ldscript", SPEC_FILES),
        );

        let mut flags = format!("{} -Wl,-T {}", LINKFLAGS, ldscript.display());

        flags.push_str(" -Wl,--start-group");
        for lib in LINK_GROUP {
            flags.push(' ');
            flags.push_str(&Self::develop_lib(sdk_root, lib));
        }
        flags.push_str(" -Wl,--end-group");

        flags.push_str(" -Wl,--start-group ");
        flags.push_str(&Self::develop_lib(sdk_root, "nnSdkEn.nss"));
        flags.push_str(" -Wl,--end-group ");

        flags.push_str(&Self::develop_lib(sdk_root, "crtend.o"));
        flags
    }
}

impl PlatformToolchain for Nx64Toolchain {
    fn name(&self) -> &'static str {
        "arm64-nx64"
    }

    fn tools(&self, sdk_root: &Path) -> ToolchainConfig {
        let bin = |tool: &str| sdk_path(sdk_root, &format!("{}/{}", COMPILER_BIN, tool));
        let cli = |tool: &str| sdk_path(sdk_root, &format!("{}/{}", COMMAND_LINE_TOOLS, tool));

        ToolchainConfig::new(sdk_root)
            .with_tool(ToolRole::Cc, bin("clang"))
            .with_tool(ToolRole::Cxx, bin("clang++"))
            .with_tool(ToolRole::LinkCxx, bin("clang++"))
            .with_tool(ToolRole::Cpp, bin("clang"))
            .with_tool(ToolRole::Ar, bin("llvm-ar"))
            .with_tool(ToolRole::Ranlib, bin("llvm-ranlib"))
            .with_tool(ToolRole::Ld, bin("lld"))
            .with_tool(ToolRole::Converter, cli("MakeNso/MakeNso.exe"))
            .with_tool(ToolRole::MetadataGenerator, cli("MakeMeta/MakeMeta.exe"))
            .with_tool(ToolRole::AuthoringTool, cli("AuthoringTool/AuthoringTool.exe"))
            .with_test_launch_pattern("RunOnTarget.exe %s %s")
    }

    fn flags(&self, sdk_root: &Path, target: &BuildTarget) -> FlagSet {
        let build_type = target.configuration.build_type();
        let mut flags = FlagSet::new();

        flags.append_split(&[FlagKind::CFlags, FlagKind::CxxFlags], CCFLAGS);
        flags.append_split(&[FlagKind::CxxFlags], CXXFLAGS);

        flags.append_unique(
            FlagKind::Defines,
            format!("{}{}", DEFINE_PREFIX, build_type.to_ascii_uppercase()),
        );

        flags.append_split(&[FlagKind::LinkFlags], &Self::link_flags(sdk_root));

        flags.append_unique(
            FlagKind::LibPath,
            sdk_path(sdk_root, &format!("Libraries/{}/{}", SDK_BUILD_TARGET, build_type))
                .display()
                .to_string(),
        );

        flags.append_unique(
            FlagKind::CppPath,
            sdk_path(
                sdk_root,
                &format!("Common/Configs/Targets/{}/Include", SDK_BUILD_TARGET),
            )
            .display()
            .to_string(),
        );
        flags.append_unique(
            FlagKind::CppPath,
            sdk_path(sdk_root, "Include").display().to_string(),
        );

        flags
    }

    fn support_files(&self, sdk_root: &Path) -> SupportFiles {
        SupportFiles {
            descriptor: sdk_path(sdk_root, &format!("{}/Application.desc", SPEC_FILES)),
            metadata: sdk_path(
                sdk_root,
                &format!("{}/Application.aarch64.lp64.nmeta", SPEC_FILES),
            ),
            runtime_loader: sdk_path(
                sdk_root,
                &format!("Libraries/{}/Develop/nnrtld.nso", SDK_BUILD_TARGET),
            ),
            sdk_object: sdk_path(
                sdk_root,
                &format!("Libraries/{}/Develop/nnSdkEn.nso", SDK_BUILD_TARGET),
            ),
        }
    }

    fn output_patterns(&self) -> OutputPatterns {
        OutputPatterns {
            program: "%s.nss".to_string(),
            bundle: "%s.nspd".to_string(),
        }
    }

    fn adjust_target_flags(&self, flags: &mut FlagSet, name: &str, kind: TargetKind) {
        if kind.is_program() {
            flags.remove(FlagKind::LinkFlags, AUTO_IMPORT_FLAG);
        }
        if kind == TargetKind::Test && name.starts_with("test_") {
            flags.append_unique(FlagKind::Defines, TEST_NO_COLORS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildConfiguration;

    fn target(config: BuildConfiguration) -> BuildTarget {
        BuildTarget::parse("arm64-nx64", config).unwrap()
    }

    #[test]
    fn test_tool_paths() {
        let tools = Nx64Toolchain.tools(Path::new("C:/Nintendo/SDK"));

        assert_eq!(
            tools.tool(ToolRole::Cxx).unwrap(),
            Path::new("C:/Nintendo/SDK/Compilers/NX/nx/aarch64/bin/clang++")
        );
        assert_eq!(
            tools.tool(ToolRole::Converter).unwrap(),
            Path::new("C:/Nintendo/SDK/Tools/CommandLineTools/MakeNso/MakeNso.exe")
        );
        assert_eq!(tools.test_launch_pattern(), Some("RunOnTarget.exe %s %s"));
    }

    #[test]
    fn test_compile_flags() {
        let flags = Nx64Toolchain.flags(Path::new("/sdk"), &target(BuildConfiguration::Debug));

        let cflags = flags.get(FlagKind::CFlags);
        assert_eq!(cflags[0], "-mcpu=cortex-a57+fp+simd+crypto+crc");
        assert!(!cflags.contains(&"-fno-rtti".to_string()));

        let cxxflags = flags.get(FlagKind::CxxFlags);
        assert!(cxxflags.contains(&"-fno-rtti".to_string()));
        assert!(cxxflags.contains(&"-std=gnu++14".to_string()));
        assert!(cxxflags.contains(&"-fPIC".to_string()));

        assert_eq!(flags.get(FlagKind::Defines), &["NN_SDK_BUILD_DEBUG"]);
    }

    #[test]
    fn test_release_paths_and_defines() {
        let flags = Nx64Toolchain.flags(Path::new("/sdk"), &target(BuildConfiguration::Release));
        assert_eq!(flags.get(FlagKind::Defines), &["NN_SDK_BUILD_RELEASE"]);
        assert_eq!(
            flags.get(FlagKind::LibPath),
            &["/sdk/Libraries/NX-NXFP2-a64/Release"]
        );
        assert_eq!(
            flags.get(FlagKind::CppPath),
            &[
                "/sdk/Common/Configs/Targets/NX-NXFP2-a64/Include",
                "/sdk/Include"
            ]
        );
    }

    #[test]
    fn test_link_flags_are_unique_and_ordered() {
        let flags = Nx64Toolchain.flags(Path::new("/sdk"), &target(BuildConfiguration::Debug));
        let link = flags.get(FlagKind::LinkFlags);

        assert_eq!(link[0], "-nostartfiles");
        assert_eq!(
            link.iter().filter(|f| *f == "-Wl,--start-group").count(),
            1
        );
        assert_eq!(
            link.iter().filter(|f| *f == "-fdiagnostics-format=msvc").count(),
            1
        );

        let script = link.iter().position(|f| f == "-Wl,-T").unwrap();
        assert_eq!(
            link[script + 1],
            "/sdk/Resources/SpecFiles/Application.aarch64.lp64.ldscript"
        );

        let rocrt = link
            .iter()
            .position(|f| f.ends_with("Develop/rocrt.o"))
            .unwrap();
        let crtend = link
            .iter()
            .position(|f| f.ends_with("Develop/crtend.o"))
            .unwrap();
        assert!(rocrt < crtend);
        assert_eq!(crtend, link.len() - 1);
    }

    #[test]
    fn test_program_drops_auto_import() {
        let mut flags = FlagSet::new();
        flags.append_unique(FlagKind::LinkFlags, AUTO_IMPORT_FLAG);
        flags.append_unique(FlagKind::LinkFlags, "-Wl,-pie");

        let mut lib_flags = flags.clone();
        Nx64Toolchain.adjust_target_flags(&mut lib_flags, "engine", TargetKind::Library);
        assert!(lib_flags.contains(FlagKind::LinkFlags, AUTO_IMPORT_FLAG));

        Nx64Toolchain.adjust_target_flags(&mut flags, "game", TargetKind::Program);
        assert_eq!(flags.get(FlagKind::LinkFlags), &["-Wl,-pie"]);
    }

    #[test]
    fn test_test_targets_disable_colors() {
        let mut flags = FlagSet::new();
        Nx64Toolchain.adjust_target_flags(&mut flags, "test_dlib", TargetKind::Test);
        assert!(flags.contains(FlagKind::Defines, TEST_NO_COLORS));

        let mut flags = FlagSet::new();
        Nx64Toolchain.adjust_target_flags(&mut flags, "dlib_bench", TargetKind::Test);
        assert!(!flags.contains(FlagKind::Defines, TEST_NO_COLORS));
    }
}
