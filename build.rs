fn main() {
    let mut build = cc::Build::new();

    build
        .include("csrc")
        .file("csrc/vplist.c")
        .file("csrc/vplist_probe.c")
        .flag_if_supported("-std=c11")
        .flag_if_supported("-O2")
        .warnings(true);

    build.compile("ydbvp");

    println!("cargo:rerun-if-changed=csrc/vplist.h");
    println!("cargo:rerun-if-changed=csrc/vplist.c");
    println!("cargo:rerun-if-changed=csrc/vplist_probe.c");
}
