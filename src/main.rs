// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The skysim binary.

use clap::Parser;

use skysim::Skysim;

fn main() {
    // Don't return Result from main; it prints the debug representation of
    // the error rather than the display one.
    if let Err(e) = Skysim::parse().run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
