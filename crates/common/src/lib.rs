// fixup-common: wire types shared by the fixup session engine and its tools

pub mod protocol;
