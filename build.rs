fn main() {
    // macOS refuses CoreBluetooth access (scan state stays "unauthorised")
    // unless the binary carries an Info.plist with
    // NSBluetoothAlwaysUsageDescription. For a CLI tool the plist is embedded
    // into the Mach-O __TEXT,__info_plist section via the linker, which macOS
    // reads exactly like an app bundle's Info.plist.
    //
    // CARGO_CFG_TARGET_OS reflects the *target*, so cross-compiling from
    // Linux to macOS picks this up too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");
        let plist = format!("{dir}/Info.plist");

        println!("cargo:rustc-link-arg=-sectcreate");
        println!("cargo:rustc-link-arg=__TEXT");
        println!("cargo:rustc-link-arg=__info_plist");
        println!("cargo:rustc-link-arg={plist}");

        println!("cargo:rerun-if-changed=Info.plist");
    }
}
