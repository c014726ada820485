use std::env;

/// `SSL_CTX_set_ecdh_auto` exists as a real switch only in OpenSSL 1.0.2
/// and LibreSSL; 1.1.0 made it a no-op and the `openssl` crate drops it.
fn main() {
    println!("cargo:rustc-check-cfg=cfg(legacy_ecdh_auto)");
    println!("cargo:rerun-if-env-changed=DEP_OPENSSL_VERSION_NUMBER");
    println!("cargo:rerun-if-env-changed=DEP_OPENSSL_LIBRESSL_VERSION_NUMBER");

    if env::var_os("DEP_OPENSSL_LIBRESSL_VERSION_NUMBER").is_some() {
        println!("cargo:rustc-cfg=legacy_ecdh_auto");
        return;
    }
    let Some(version) = env::var("DEP_OPENSSL_VERSION_NUMBER")
        .ok()
        .and_then(|v| u64::from_str_radix(&v, 16).ok())
    else {
        return;
    };
    if (0x1000_2000..0x1010_0000).contains(&version) {
        println!("cargo:rustc-cfg=legacy_ecdh_auto");
    }
}
