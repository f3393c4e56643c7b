use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("kmp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: kmp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "protocol: version={} header={}B max_body={}B",
        kmp_frame::PROTOCOL_VERSION,
        kmp_frame::HEADER_SIZE,
        kmp_frame::MAX_BODY
    );
    println!(
        "target: {}",
        option_env!("KMP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("KMP_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!(
        "features: peer={}, async={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
