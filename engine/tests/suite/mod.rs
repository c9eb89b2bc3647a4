mod directory;
mod scenarios;
