use u3vcam_device::regmap::{register_name, RegisterInfo, REGISTERS};

use crate::cmd::RegmapArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_registers, OutputFormat};

pub fn run(args: RegmapArgs, format: OutputFormat) -> CliResult<i32> {
    let registers = select(&args)?;
    print_registers(&registers, format);
    Ok(SUCCESS)
}

fn select(args: &RegmapArgs) -> CliResult<Vec<RegisterInfo>> {
    let Some(address) = args.resolve else {
        return Ok(REGISTERS.to_vec());
    };
    let name = register_name(address, args.sirm);
    let found: Vec<RegisterInfo> = REGISTERS
        .iter()
        .filter(|info| info.name == name)
        .copied()
        .collect();
    if found.is_empty() {
        return Err(CliError::new(
            USAGE,
            format!("no known register at {address:#x}"),
        ));
    }
    Ok(found)
}
