// Build script to compile GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/triangle.vert", "shaders/triangle.frag"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    // Compile shaders using glslc (part of Vulkan SDK)
    for shader in SHADERS {
        compile_shader(shader, &format!("{}.spv", shader));
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), shaders were not compiled", e);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
