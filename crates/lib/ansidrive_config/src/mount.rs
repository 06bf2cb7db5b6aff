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

    ansidrive_config::mount.rs

    Command line image mount specifications.
*/

use std::str::FromStr;

/// Attach an image to a device id: `<id>:<image>`. The image part may itself be a
/// `RAW:<start>:<end>:<path>` window specification.
#[derive(Clone, Debug, PartialEq)]
pub struct MountSpec {
    pub id: u8,
    pub image: String,
}

impl FromStr for MountSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id_str, image) = s.split_once(':').ok_or("Missing device id")?;

        let id: u8 = id_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid device id: {id_str}"))?;
        if id as usize >= ansidrive_core::devices::ansi::MAX_DEVICES {
            return Err(format!("Device id out of range (0-7): {id}"));
        }
        if image.is_empty() {
            return Err("Missing image path".to_string());
        }

        Ok(MountSpec {
            id,
            image: image.to_string(),
        })
    }
}
