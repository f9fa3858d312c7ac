/// Build script for dxframe
///
/// # Shader Compilation Strategy:
/// - DX12: HLSL source is embedded with `include_str!` and compiled at runtime via D3DCompile
/// - Headless: shaders are opaque placeholder bytes, nothing to compile
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=src/gfx/dx12/shaders/shader.hlsl");
    println!("cargo:rerun-if-changed=build.rs");
}
