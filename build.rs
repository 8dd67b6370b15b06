// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 构建脚本: 静态FFmpeg在Windows下的系统库依赖
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 仅在Windows MSVC环境下需要
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // DirectShow 摄像头采集
        println!("cargo:rustc-link-lib=dylib=strmiids");
        println!("cargo:rustc-link-lib=dylib=ole32");
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (网络输入)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
