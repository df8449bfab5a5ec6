mod cli;
mod playback;
mod support;
