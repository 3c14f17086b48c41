mod boot;
mod common;
mod run;
