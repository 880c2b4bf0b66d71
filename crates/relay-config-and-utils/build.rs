fn main() {
    // option_env!() defaults in config.rs
    println!("cargo:rerun-if-env-changed=SUPABASE_URL");
    println!("cargo:rerun-if-env-changed=SUPABASE_PUBLISHABLE_KEY");
    println!("cargo:rerun-if-env-changed=SIFT_SITE_URL");
    println!("cargo:rerun-if-env-changed=SIFT_EXTENSION_ID");
}
