// build.rs
fn main() {
    // Build info for the startup banner. Missing git metadata only degrades
    // the banner, so a failure here must not break the build.
    if let Err(e) = vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
    {
        println!("cargo:warning=Unable to generate build info: {e}");
    }
}
