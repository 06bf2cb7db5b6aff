/*
    AnsiDrive

    Copyright 2024-2025 AnsiDrive contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    ansidrive_config::bpaf_config::mod.rs

    Command line argument parsing with bpaf.
*/

use std::path::PathBuf;

use crate::mount::MountSpec;

use bpaf::{Bpaf, Parser};

fn mount_arg() -> impl Parser<Vec<MountSpec>> {
    bpaf::short('m')
        .long("mount")
        .help("Attach an image to a device with syntax: 0:disk.img")
        .argument::<String>("mountspec")
        .parse(|s| s.parse::<MountSpec>())
        .many()
}

#[cfg_attr(feature = "use_bpaf", derive(Bpaf))]
#[cfg_attr(feature = "use_bpaf", bpaf(options, version, generate(cli_args)))]
#[derive(Debug, Default)]
pub struct CmdLineArgs {
    #[bpaf(long("config_file"), long("configfile"))]
    pub config_file: Option<PathBuf>,

    #[bpaf(long("image_dir"), long("imagedir"))]
    pub image_dir: Option<PathBuf>,

    #[bpaf(long)]
    pub script: Option<PathBuf>,

    #[bpaf(long("report_file"), long("report"))]
    pub report_file: Option<PathBuf>,

    #[bpaf(long)]
    pub timestep_us: Option<f64>,

    #[bpaf(long("system_preset"), long("preset"))]
    pub system_preset: Option<String>,

    #[bpaf(long("trace_pins"), long("tracepins"), switch)]
    pub trace_pins: bool,

    #[bpaf(long("no_image_scan"), long("noimagescan"), switch)]
    pub no_image_scan: bool,

    #[bpaf(external(mount_arg))]
    pub mounts: Vec<MountSpec>,
}
