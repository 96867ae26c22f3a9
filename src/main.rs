// Copyright (c) 2024 texer.ai Ltd.

fn main() {
    match alf::cli::main() {
        Ok(status) => std::process::exit(status.code()),
        Err(report) => {
            alf::errorln!("{report:?}");
            std::process::exit(alf::error::ExitStatus::Failure.code());
        }
    }
}
