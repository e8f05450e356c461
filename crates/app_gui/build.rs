use std::env;

fn main() {
    let version =
        env::var("BLIGHT_VERSION").unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap());
    println!("cargo:rustc-env=BLIGHT_VERSION={version}");
}
